//! Order-only inputs: required to exist, ordered before the consumer, but
//! their mtimes never trigger rebuilds.

use crate::e2e::*;

#[test]
fn newer_order_only_input_does_not_rebuild() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build obj_dir: touch",
            "build out: touch main.c || obj_dir",
            "",
        ]
        .join("\n"),
    )?;
    space.write("main.c", "")?;

    // First build makes both the order-only dep and the output.
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "ran 2 tasks");

    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "no work to do");

    // Make obj_dir newer than out: still nothing to do.
    space.touch("obj_dir", "")?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "no work to do");
    Ok(())
}

#[test]
fn deleted_order_only_input_rebuilds() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build obj_dir: touch",
            "build out: touch main.c || obj_dir",
            "",
        ]
        .join("\n"),
    )?;
    space.write("main.c", "")?;
    space.run_expect(&mut nb_command(vec!["out"]))?;

    // Deleting the order-only input fails the existence check: both it and
    // the consumer run again.
    space.remove("obj_dir")?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "ran 2 tasks");
    Ok(())
}

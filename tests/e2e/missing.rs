//! Errors for inputs and targets that don't exist.

use crate::e2e::*;

#[test]
fn missing_input_with_no_rule() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    let out = space.run(&mut nb_command(vec!["out"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "\"in\" missing and no known rule to make it");
    Ok(())
}

#[test]
fn unknown_target_with_suggestion() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    let out = space.run(&mut nb_command(vec!["oot"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "unknown target \"oot\", did you mean \"out\"?");
    Ok(())
}

#[test]
fn unknown_target_without_suggestion() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    let out = space.run(&mut nb_command(vec!["completely-unrelated"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "unknown target \"completely-unrelated\"");
    assert_output_not_contains(&out, "did you mean");
    Ok(())
}

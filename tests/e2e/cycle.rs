//! Dependency cycles are detected during analysis, before anything runs.

use crate::e2e::*;

#[test]
fn simple_cycle() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule cc
  command = touch $out
build x: cc y
build y: cc x
",
    )?;
    let out = space.run(&mut nb_command(vec!["x"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "dependency cycle: x -> y -> x");
    // Nothing was spawned.
    assert!(space.read("x").is_err());
    assert!(space.read("y").is_err());
    Ok(())
}

#[test]
fn self_cycle() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule cc
  command = touch $out
build x: cc x
",
    )?;
    let out = space.run(&mut nb_command(vec!["x"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "dependency cycle: x -> x");
    Ok(())
}

//! The -k flag: how many task failures stop the build.

use crate::e2e::*;

const FAIL_MIDDLE: &str = "
rule touch
  command = touch $out
rule fail
  command = exit 1
build a: touch
build b: fail
build c: touch
";

#[test]
fn default_stops_after_first_failure() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", FAIL_MIDDLE)?;

    // Serialize with -j1 and list the failing target first, so nothing
    // else gets a chance to start.
    let out = space.run(&mut nb_command(vec!["-j", "1", "b", "a", "c"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "failed:");
    assert!(space.read("a").is_err());
    assert!(space.read("c").is_err());
    Ok(())
}

#[test]
fn keep_going_attempts_everything() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", FAIL_MIDDLE)?;

    // -k 0: never stop early.  The build still reports failure, but the
    // independent tasks ran and were logged.
    let out = space.run(&mut nb_command(vec!["-j", "1", "-k", "0", "b", "a", "c"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "failed:");
    assert!(space.read("a").is_ok());
    assert!(space.read("c").is_ok());

    let log = String::from_utf8(space.read(".ninja_log")?)?;
    assert!(log.contains("\ta\t"));
    assert!(log.contains("\tc\t"));
    assert!(!log.contains("\tb\t"));
    Ok(())
}

#[test]
fn higher_threshold_keeps_building() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", FAIL_MIDDLE)?;

    // -k 3 tolerates the single failure and finishes the rest.
    let out = space.run(&mut nb_command(vec!["-j", "1", "-k", "3", "b", "a", "c"]))?;
    assert!(!out.status.success());
    assert!(space.read("a").is_ok());
    assert!(space.read("c").is_ok());
    Ok(())
}

#[test]
fn failure_blocks_dependents() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule touch
  command = touch $out
rule fail
  command = exit 1
build mid: fail
build out: touch mid
",
    )?;
    let out = space.run(&mut nb_command(vec!["-k", "0", "out"]))?;
    assert!(!out.status.success());
    assert!(space.read("out").is_err());
    Ok(())
}

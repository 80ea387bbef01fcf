//! Restat rules: commands that may leave their output untouched, cutting
//! off downstream rebuilds.

use crate::e2e::*;

#[cfg(unix)]
const RESTAT_MANIFEST: &str = "
rule gen
  command = cmp -s in $out || cp in $out
  restat = 1
rule copy
  command = cp $in $out
build mid: gen in
build out: copy mid
";

#[cfg(unix)]
#[test]
fn unchanged_restat_output_stops_cascade() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", RESTAT_MANIFEST)?;
    space.write("in", "hello")?;

    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "ran 2 tasks");

    // Rewrite the input with identical content: `gen` runs again, notices
    // nothing changed, and `copy` is pruned from the plan.
    space.touch("in", "hello")?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "ran 1 task");

    // The log's recorded restat mtime keeps later runs quiet even though
    // mid is older than in on disk.
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "no work to do");
    Ok(())
}

#[cfg(unix)]
#[test]
fn changed_restat_output_still_cascades() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", RESTAT_MANIFEST)?;
    space.write("in", "one")?;
    space.run_expect(&mut nb_command(vec!["out"]))?;

    space.touch("in", "two")?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "ran 2 tasks");
    assert_eq!(space.read("out")?, b"two");
    Ok(())
}

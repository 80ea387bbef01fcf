//! Dependencies discovered through depfiles.

use crate::e2e::*;

#[cfg(unix)]
const DEPFILE_RULE: &str = "
rule cc
  command = touch $out && echo \"$out: hdr.h\" > $out.d
  depfile = $out.d
";

#[cfg(unix)]
#[test]
fn depfile_deps_trigger_rebuild() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[DEPFILE_RULE, "build main.o: cc main.c", ""].join("\n"),
    )?;
    space.write("main.c", "")?;
    space.write("hdr.h", "")?;

    let out = space.run_expect(&mut nb_command(vec!["main.o"]))?;
    assert_output_contains(&out, "ran 1 task");
    assert!(space.read("main.o.d").is_ok());

    // The discovered header is now tracked: nothing to do while it's
    // unchanged...
    let out = space.run_expect(&mut nb_command(vec!["main.o"]))?;
    assert_output_contains(&out, "no work to do");

    // ...and touching it rebuilds, even though the manifest never mentions
    // hdr.h.
    space.touch("hdr.h", "")?;
    let out = space.run_expect(&mut nb_command(vec!["main.o"]))?;
    assert_output_contains(&out, "ran 1 task");
    Ok(())
}

#[cfg(unix)]
#[test]
fn deleted_discovered_dep_rebuilds() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[DEPFILE_RULE, "build main.o: cc main.c", ""].join("\n"),
    )?;
    space.write("main.c", "")?;
    space.write("hdr.h", "")?;
    space.run_expect(&mut nb_command(vec!["main.o"]))?;

    // A deleted discovered dep isn't fatal like a deleted declared input;
    // it just means the output is out of date.
    space.remove("hdr.h")?;
    let out = space.run_expect(&mut nb_command(vec!["main.o"]))?;
    assert_output_contains(&out, "ran 1 task");
    Ok(())
}

#[cfg(unix)]
#[test]
fn missing_depfile_is_not_an_error() -> anyhow::Result<()> {
    // The first build has no depfile on disk yet; analysis just proceeds
    // with the declared deps.
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[DEPFILE_RULE, "build main.o: cc main.c", ""].join("\n"),
    )?;
    space.write("main.c", "")?;
    space.write("hdr.h", "")?;
    let out = space.run_expect(&mut nb_command(vec!["main.o"]))?;
    assert_output_contains(&out, "ran 1 task");
    Ok(())
}

//! Tests around regenerating the build.ninja file itself.

use crate::e2e::*;

#[cfg(unix)]
#[test]
fn generate_build_file() -> anyhow::Result<()> {
    // A project where a build rule generates the build.ninja.
    let space = TestSpace::new()?;
    space.write(
        "gen.sh",
        "
echo 'regenerating build.ninja'
cat >build.ninja <<EOT
rule regen
  command = sh ./gen.sh
  generator = 1
build build.ninja: regen gen.sh
rule touch
  command = touch \\$out
build out: touch
EOT
",
    )?;

    // Generate the initial build.ninja.
    space.run_expect(std::process::Command::new("sh").args(vec!["./gen.sh"]))?;

    // First run: regenerate, because there's no record of how the file was
    // made, then build the user target against the fresh manifest.
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "regenerating build.ninja");
    assert_output_contains(&out, "ran 2 tasks");

    // Second run: everything is up to date, and in particular the
    // regeneration didn't loop.
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_not_contains(&out, "regenerating build.ninja");
    assert_output_contains(&out, "no work to do");
    Ok(())
}

#[cfg(unix)]
#[test]
fn newer_manifest_source_rebuilds_manifest() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let manifest = "
rule regen
  command = cp build.ninja.in build.ninja
  description = regenerating
  generator = 1
build build.ninja: regen build.ninja.in
rule touch
  command = touch $out
build out: touch
";
    space.write("build.ninja.in", manifest)?;
    space.write("build.ninja", manifest)?;

    // Settle: first run records the regen in the log.
    space.run_expect(&mut nb_command(vec!["out"]))?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "no work to do");

    // Touch the source: the manifest is rebuilt and reloaded before the
    // user build, at most once.
    space.touch("build.ninja.in", manifest)?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "regenerating");
    assert_output_contains(&out, "ran 1 task, now up to date");
    Ok(())
}

#[cfg(unix)]
#[test]
fn generate_build_file_failure() -> anyhow::Result<()> {
    // The regen rule failing stops the run.
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build out: touch",
            "
rule regen
  command = sh ./gen.sh
  generator = 1",
            "build build.ninja: regen gen.sh",
            "",
        ]
        .join("\n"),
    )?;
    space.write("gen.sh", "exit 1")?;

    let out = space.run(&mut nb_command(vec!["out"]))?;
    assert!(!out.status.success());
    assert_output_contains(&out, "failed:");
    Ok(())
}

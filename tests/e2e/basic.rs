use crate::e2e::*;

#[test]
fn empty_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("build.ninja", "")?;
    let out = space.run(&mut nb_command(vec![]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "nb: no work to do\n");
    Ok(())
}

#[test]
fn basic_build() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "ran 1 task");
    assert!(space.read("out").is_ok());

    // The build log has an entry for the output now.
    let log = String::from_utf8(space.read(".ninja_log")?)?;
    assert!(log.starts_with("# ninja log v"));
    assert!(log.contains("out"));

    // A second run has nothing to do.
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "no work to do");
    Ok(())
}

#[test]
fn changed_command_rebuilds() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let manifest = |cmd: &str| {
        format!(
            "
rule cc
  command = {}
build a.o: cc a.c
",
            cmd
        )
    };
    space.write("build.ninja", &manifest("echo $in > $out"))?;
    space.write("a.c", "")?;
    let out = space.run_expect(&mut nb_command(vec!["a.o"]))?;
    assert_output_contains(&out, "ran 1 task");

    // Unchanged: nothing to do.
    let out = space.run_expect(&mut nb_command(vec!["a.o"]))?;
    assert_output_contains(&out, "no work to do");

    // Change only the command text; no input mtime moved, but the hash in
    // the build log no longer matches.
    space.write("build.ninja", &manifest("echo X$in > $out"))?;
    let out = space.run_expect(&mut nb_command(vec!["a.o"]))?;
    assert_output_contains(&out, "ran 1 task");
    assert_eq!(space.read("a.o")?, b"Xa.c\n");
    Ok(())
}

#[test]
fn create_subdir() -> anyhow::Result<()> {
    // A build rule whose output lives in a directory that doesn't exist
    // yet.
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build subdir/out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    space.run_expect(&mut nb_command(vec!["subdir/out"]))?;
    assert!(space.read("subdir/out").is_ok());
    Ok(())
}

#[test]
fn specify_build_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build_specified.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    space.run_expect(&mut nb_command(vec!["-f", "build_specified.ninja", "out"]))?;
    assert!(space.read("out").is_ok());
    Ok(())
}

#[test]
fn default_targets() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "build a: touch",
            "build b: touch",
            "default b",
            "",
        ]
        .join("\n"),
    )?;
    space.run_expect(&mut nb_command(vec![]))?;
    assert!(space.read("b").is_ok());
    assert!(space.read("a").is_err());
    Ok(())
}

#[test]
fn no_default_builds_roots() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build mid: touch", "build root: touch mid", ""].join("\n"),
    )?;
    space.run_expect(&mut nb_command(vec![]))?;
    assert!(space.read("root").is_ok());
    Ok(())
}

#[test]
fn phony_depends() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            TOUCH_RULE,
            "
build out1: touch
build out2: phony out1
build out3: phony out2
",
        ]
        .join("\n"),
    )?;
    space.run_expect(&mut nb_command(vec!["out3"]))?;
    space.read("out1")?;
    Ok(())
}

#[test]
fn builddir_controls_log_location() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[
            "builddir = foo",
            TOUCH_RULE,
            "build $builddir/bar: touch",
            "",
        ]
        .join("\n"),
    )?;
    space.run_expect(&mut nb_command(vec!["foo/bar"]))?;
    space.read("foo/.ninja_log")?;
    Ok(())
}

#[cfg(unix)]
#[test]
fn rspfile_protocol() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule cat
  command = cat ${out}.rsp > ${out}
  rspfile = ${out}.rsp
  rspfile_content = 1 $in 2 $in_newline 3
build main: cat foo bar
",
    )?;
    space.write("foo", "")?;
    space.write("bar", "")?;
    space.run_expect(&mut nb_command(vec!["main"]))?;

    // The command saw the response file's evaluated content...
    assert_eq!(space.read("main")?, b"1 foo bar 2 foo\nbar 3");
    // ...and the file was cleaned up after the command came back.
    assert!(space.read("main.rsp").is_err());
    Ok(())
}

#[cfg(unix)]
#[test]
fn rspfile_in_subdir_keeps_dir() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule litter
  command = cat make/me/${out}.rsp > ${out}
  rspfile = make/me/${out}.rsp
  rspfile_content = random stuff
build foo: litter
",
    )?;
    space.run_expect(&mut nb_command(vec!["foo"]))?;
    assert_eq!(space.read("foo")?, b"random stuff");
    // The directory created for the response file stays behind.
    assert!(space.metadata("make/me")?.is_dir());
    Ok(())
}

#[test]
fn dry_run_touches_nothing() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    let out = space.run_expect(&mut nb_command(vec!["-n", "out"]))?;
    assert_output_contains(&out, "ran 1 task");
    assert!(space.read("out").is_err());

    // A real run afterwards still has the work to do.
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "ran 1 task");
    assert!(space.read("out").is_ok());
    Ok(())
}

#[cfg(unix)]
#[test]
fn verbose_prints_command_lines() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        &[TOUCH_RULE, "build out: touch in", ""].join("\n"),
    )?;
    space.write("in", "")?;
    let out = space.run_expect(&mut nb_command(vec!["-v", "out"]))?;
    assert_output_contains(&out, "touch out");
    Ok(())
}

#[cfg(unix)]
#[test]
fn spam_output_shows_up() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule quiet
  description = quiet $out
  command = touch $out
rule spam
  description = spam $out
  command = echo greetz from $out && touch $out
build a: quiet
build b: spam a
build c: quiet b
",
    )?;
    let out = space.run_expect(&mut nb_command(vec!["-j", "1", "c"]))?;
    assert_output_contains(
        &out,
        "quiet a
spam b
greetz from b
quiet c
",
    );
    Ok(())
}

#[test]
fn include_and_subninja() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
include rules.ninja
subninja sub.ninja
build out: touch in
",
    )?;
    space.write(
        "rules.ninja",
        "
rule touch
  command = touch $out
",
    )?;
    space.write("sub.ninja", "build subout: touch in\n")?;
    space.write("in", "")?;
    let out = space.run_expect(&mut nb_command(vec!["out", "subout"]))?;
    assert_output_contains(&out, "ran 2 tasks");
    assert!(space.read("out").is_ok());
    assert!(space.read("subout").is_ok());
    Ok(())
}

#[cfg(unix)]
#[test]
fn utf8_filename() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "build.ninja",
        "
rule echo
  description = unicode variable: $in
  command = echo unicode command line: $in && touch $out
build out: echo reykjavík.md
",
    )?;
    space.write("reykjavík.md", "")?;
    let out = space.run_expect(&mut nb_command(vec!["out"]))?;
    assert_output_contains(&out, "unicode command line: reykjavík.md");
    Ok(())
}

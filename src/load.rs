//! Loads .ninja manifests into an in-memory State: parses statements,
//! resolves variable scopes, canonicalizes and interns paths, and builds the
//! graph.

use crate::canon::canon_path;
use crate::eval::{Env, EvalString, Vars};
use crate::fs::FileSystem;
use crate::graph::{Build, FileId, FileLoc, Graph, RspFile};
use crate::parse::{Parser, Statement};
use crate::smallmap::SmallMap;
use anyhow::{anyhow, bail};
use std::borrow::Cow;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A rule as stored in the loader: named templates, expanded per edge.
struct Rule {
    vars: SmallMap<String, EvalString<String>>,
}

/// The loaded result of a manifest: everything the builder needs.
#[derive(Debug)]
pub struct State {
    pub graph: Graph,
    /// Targets declared `default`, in declaration order.
    pub default: Vec<FileId>,
    /// Value of the top-level `builddir` binding, if any; decides where the
    /// build log lives.
    pub builddir: Option<String>,
}

/// The special variables an edge provides to its rule's templates.
struct BuildImplicitVars<'a> {
    graph: &'a Graph,
    explicit_ins: &'a [FileId],
    explicit_outs: &'a [FileId],
}

impl<'a> BuildImplicitVars<'a> {
    fn join(&self, ids: &[FileId], sep: char) -> String {
        let mut out = String::new();
        for &id in ids {
            if !out.is_empty() {
                out.push(sep);
            }
            out.push_str(&self.graph.file(id).name);
        }
        out
    }
}

impl<'a> Env for BuildImplicitVars<'a> {
    fn get_var(&self, var: &str) -> Option<Cow<str>> {
        match var {
            "in" => Some(Cow::Owned(self.join(self.explicit_ins, ' '))),
            "in_newline" => Some(Cow::Owned(self.join(self.explicit_ins, '\n'))),
            "out" => Some(Cow::Owned(self.join(self.explicit_outs, ' '))),
            _ => None,
        }
    }
}

/// The scope chain visible while expanding one edge's rule templates:
/// edge bindings, then $in/$out, then other rule variables (recursively
/// expanded in this same scope), then the file scope.
struct EdgeEnv<'a> {
    bindings: &'a SmallMap<String, String>,
    implicit: BuildImplicitVars<'a>,
    rule: &'a Rule,
    vars: &'a Vars,
    /// Rule variables currently being expanded, to cut reference cycles.
    expanding: RefCell<Vec<String>>,
}

impl<'a> Env for EdgeEnv<'a> {
    fn get_var(&self, var: &str) -> Option<Cow<str>> {
        if let Some(val) = self.bindings.get(var) {
            return Some(Cow::Borrowed(val.as_str()));
        }
        if let Some(val) = self.implicit.get_var(var) {
            return Some(val);
        }
        if let Some(template) = self.rule.vars.get(var) {
            if self.expanding.borrow().iter().any(|v| v == var) {
                return Some(Cow::Owned(String::new()));
            }
            self.expanding.borrow_mut().push(var.to_owned());
            let val = template.evaluate(&[self]);
            self.expanding.borrow_mut().pop();
            return Some(Cow::Owned(val));
        }
        self.vars.get_var(var)
    }
}

struct Loader {
    graph: Graph,
    default: Vec<FileId>,
    rules: SmallMap<String, Rule>,
    vars: Vars,
}

impl Loader {
    fn new() -> Self {
        let mut loader = Loader {
            graph: Graph::new(),
            default: Vec::new(),
            rules: SmallMap::default(),
            vars: Vars::default(),
        };
        // The one builtin rule: no command, groups its inputs.
        loader.rules.insert(
            "phony".to_owned(),
            Rule {
                vars: SmallMap::default(),
            },
        );
        loader
    }

    fn path(&mut self, path: String) -> anyhow::Result<FileId> {
        Ok(self.graph.file_id(canon_path(path)?))
    }

    fn read_file(&mut self, fs: &dyn FileSystem, path: &str) -> anyhow::Result<()> {
        let mut bytes = fs
            .read(path)
            .map_err(|err| anyhow!("read {}: {}", path, err))?;
        bytes.push(0);
        let filename = Rc::new(PathBuf::from(path));

        let mut parser = Parser::new(&bytes);
        loop {
            let stmt = match parser
                .read()
                .map_err(|err| anyhow!(parser.format_parse_error(Path::new(path), err)))?
            {
                None => break,
                Some(stmt) => stmt,
            };
            match stmt {
                Statement::VarDef(def) => {
                    let value = def.value.evaluate(&[&self.vars]);
                    self.vars.insert(def.name.to_owned(), value);
                }
                Statement::Rule(rule) => {
                    if self.rules.get(rule.name).is_some() {
                        bail!("{}: duplicate rule {:?}", path, rule.name);
                    }
                    let mut vars = SmallMap::default();
                    for (name, val) in rule.vars.into_iter() {
                        vars.insert(name.to_owned(), val.into_owned());
                    }
                    self.rules.insert(rule.name.to_owned(), Rule { vars });
                }
                Statement::Build(build) => self.add_build(&filename, build)?,
                Statement::Default(defaults) => {
                    for target in defaults {
                        let target = canon_path(target.evaluate(&[&self.vars]))?;
                        match self.graph.lookup(&target) {
                            Some(id) => self.default.push(id),
                            None => bail!("unknown default target {:?}", target),
                        }
                    }
                }
                Statement::Include(file) => {
                    let file = canon_path(file.evaluate(&[&self.vars]))?;
                    self.read_file(fs, &file)?;
                }
                Statement::Subninja(file) => {
                    let file = canon_path(file.evaluate(&[&self.vars]))?;
                    // The subfile sees the enclosing scope, but its own
                    // bindings don't escape.
                    let saved_vars = self.vars.clone();
                    self.read_file(fs, &file)?;
                    self.vars = saved_vars;
                }
                Statement::Pool(_) => {
                    // Accepted for manifest compatibility; the scheduler
                    // does not limit pools.
                }
            }
        }
        Ok(())
    }

    fn add_build(&mut self, filename: &Rc<PathBuf>, b: crate::parse::Build) -> anyhow::Result<()> {
        let location = FileLoc {
            filename: filename.clone(),
            line: b.line,
        };

        // The build's own bindings see the file scope but not each other.
        let mut bindings: SmallMap<String, String> = SmallMap::default();
        for (name, val) in b.vars.iter() {
            bindings.insert(name.to_string(), val.evaluate(&[&self.vars]));
        }

        let mut ins: Vec<FileId> = Vec::with_capacity(b.ins.len());
        for path in &b.ins {
            let path = path.evaluate(&[&bindings as &dyn Env, &self.vars]);
            ins.push(self.path(path)?);
        }
        let mut outs: Vec<FileId> = Vec::with_capacity(b.outs.len());
        for path in &b.outs {
            let path = path.evaluate(&[&bindings as &dyn Env, &self.vars]);
            outs.push(self.path(path)?);
        }

        let rule = match self.rules.get(b.rule) {
            Some(rule) => rule,
            None => bail!("{}: unknown rule {:?}", location, b.rule),
        };

        let env = EdgeEnv {
            bindings: &bindings,
            implicit: BuildImplicitVars {
                graph: &self.graph,
                explicit_ins: &ins[0..b.explicit_ins],
                explicit_outs: &outs[0..b.explicit_outs],
            },
            rule,
            vars: &self.vars,
            expanding: RefCell::new(Vec::new()),
        };
        let lookup = |var: &str| -> Option<String> {
            env.get_var(var)
                .map(|val| val.into_owned())
                .filter(|val| !val.is_empty())
        };

        let cmdline = lookup("command");
        let desc = lookup("description");
        let depfile = lookup("depfile");
        let rspfile_path = lookup("rspfile");
        let rspfile_content = lookup("rspfile_content");
        let rspfile = match (rspfile_path, rspfile_content) {
            (None, None) => None,
            (Some(path), Some(content)) => Some(RspFile {
                path: PathBuf::from(path),
                content,
            }),
            _ => bail!("{}: rspfile and rspfile_content need each other", location),
        };
        let generator = lookup("generator").is_some();
        let restat = lookup("restat").is_some();

        let mut build = Build::new(location);
        build.cmdline = cmdline;
        build.desc = desc;
        build.depfile = depfile;
        build.rspfile = rspfile;
        build.generator = generator;
        build.restat = restat;
        build.set_ins(ins, b.explicit_ins, b.implicit_ins, b.order_only_ins);
        build.set_outs(outs, b.explicit_outs);
        self.graph.add_build(build)?;
        Ok(())
    }
}

/// Load the manifest at `build_filename` and everything it includes,
/// producing the State the builder works from.
pub fn read(fs: &dyn FileSystem, build_filename: &str) -> anyhow::Result<State> {
    let mut loader = Loader::new();
    loader.read_file(fs, &canon_path(build_filename)?)?;
    Ok(State {
        builddir: loader.vars.get("builddir").cloned(),
        graph: loader.graph,
        default: loader.default,
    })
}

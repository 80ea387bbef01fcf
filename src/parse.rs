//! Parser for .ninja files.
//!
//! Produces one Statement at a time; the loader (see load.rs) owns variable
//! scoping and graph construction, so that `include` and `subninja` can
//! recurse across files.  To avoid allocations the parser frequently returns
//! references into the input text, marked with the lifetime `'text`.

use crate::{
    eval::{EvalPart, EvalString},
    scanner::{ParseError, ParseResult, Scanner},
    smallmap::SmallMap,
};
use std::path::Path;

/// A list of variable bindings, as expressed with syntax like:
///   key = $val
pub type VarList<'text> = SmallMap<&'text str, EvalString<&'text str>>;

pub struct Rule<'text> {
    pub name: &'text str,
    pub vars: VarList<'text>,
}

pub struct Build<'text> {
    pub rule: &'text str,
    pub line: usize,
    pub outs: Vec<EvalString<&'text str>>,
    pub explicit_outs: usize,
    pub ins: Vec<EvalString<&'text str>>,
    pub explicit_ins: usize,
    pub implicit_ins: usize,
    pub order_only_ins: usize,
    pub vars: VarList<'text>,
}

#[derive(Debug)]
pub struct Pool<'text> {
    pub name: &'text str,
    pub depth: usize,
}

pub struct VarDef<'text> {
    pub name: &'text str,
    pub value: EvalString<&'text str>,
}

pub enum Statement<'text> {
    Rule(Rule<'text>),
    Build(Build<'text>),
    Default(Vec<EvalString<&'text str>>),
    Include(EvalString<&'text str>),
    Subninja(EvalString<&'text str>),
    Pool(Pool<'text>),
    VarDef(VarDef<'text>),
}

pub struct Parser<'text> {
    scanner: Scanner<'text>,
    /// Reading EvalStrings is very hot when parsing, so always read into
    /// this buffer and clone it afterwards.
    eval_buf: Vec<EvalPart<&'text str>>,
}

impl<'text> Parser<'text> {
    pub fn new(buf: &'text [u8]) -> Parser<'text> {
        Parser {
            scanner: Scanner::new(buf),
            eval_buf: Vec::with_capacity(16),
        }
    }

    pub fn format_parse_error(&self, filename: &Path, err: ParseError) -> String {
        self.scanner.format_parse_error(filename, err)
    }

    pub fn read(&mut self) -> ParseResult<Option<Statement<'text>>> {
        loop {
            match self.scanner.peek() {
                '\0' => return Ok(None),
                '\n' | '\r' => self.scanner.next(),
                '#' => self.skip_comment()?,
                ' ' | '\t' => return self.scanner.parse_error("unexpected whitespace"),
                _ => {
                    let ident = self.read_ident()?;
                    self.skip_spaces();
                    return Ok(Some(match ident {
                        "rule" => Statement::Rule(self.read_rule()?),
                        "build" => Statement::Build(self.read_build()?),
                        "default" => Statement::Default(self.read_default()?),
                        "include" => Statement::Include(self.read_path_eval()?),
                        "subninja" => Statement::Subninja(self.read_path_eval()?),
                        "pool" => Statement::Pool(self.read_pool()?),
                        ident => Statement::VarDef(VarDef {
                            name: ident,
                            value: self.read_vardef()?,
                        }),
                    }));
                }
            }
        }
    }

    fn read_path_eval(&mut self) -> ParseResult<EvalString<&'text str>> {
        let result = self.read_eval(false)?;
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        Ok(result)
    }

    /// Read the `= ...` part of a variable definition.
    fn read_vardef(&mut self) -> ParseResult<EvalString<&'text str>> {
        self.skip_spaces();
        self.scanner.expect('=')?;
        self.skip_spaces();
        // read_eval errors out if there's nothing to read, but an empty
        // value is legal.
        if self.scanner.peek_newline() {
            self.scanner.skip('\r');
            self.scanner.expect('\n')?;
            return Ok(EvalString::new(Vec::new()));
        }
        let result = self.read_eval(false);
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        result
    }

    /// Read a collection of `  foo = bar` variables, with leading indent.
    fn read_scoped_vars(
        &mut self,
        variable_name_validator: fn(var: &str) -> bool,
    ) -> ParseResult<VarList<'text>> {
        let mut vars = VarList::default();
        while self.scanner.peek() == ' ' {
            self.scanner.skip_spaces();
            let name = self.read_ident()?;
            if !variable_name_validator(name) {
                self.scanner
                    .parse_error(format!("unexpected variable {:?}", name))?;
            }
            self.skip_spaces();
            let val = self.read_vardef()?;
            vars.insert(name, val);
        }
        Ok(vars)
    }

    fn read_rule(&mut self) -> ParseResult<Rule<'text>> {
        let name = self.read_ident()?;
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        let vars = self.read_scoped_vars(|var| {
            matches!(
                var,
                "command"
                    | "depfile"
                    | "description"
                    | "generator"
                    | "pool"
                    | "restat"
                    | "rspfile"
                    | "rspfile_content"
            )
        })?;
        Ok(Rule { name, vars })
    }

    fn read_pool(&mut self) -> ParseResult<Pool<'text>> {
        let name = self.read_ident()?;
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        let vars = self.read_scoped_vars(|var| matches!(var, "depth"))?;
        let mut depth = 0;
        if let Some((_, val)) = vars.into_iter().next() {
            let val = val.evaluate(&[]);
            depth = match val.parse::<usize>() {
                Ok(d) => d,
                Err(err) => return self.scanner.parse_error(format!("pool depth: {}", err)),
            }
        }
        Ok(Pool { name, depth })
    }

    fn read_paths_to(&mut self, v: &mut Vec<EvalString<&'text str>>) -> ParseResult<()> {
        self.skip_spaces();
        while self.scanner.peek() != ':'
            && self.scanner.peek() != '|'
            && !self.scanner.peek_newline()
        {
            v.push(self.read_eval(true)?);
            self.skip_spaces();
        }
        Ok(())
    }

    fn read_build(&mut self) -> ParseResult<Build<'text>> {
        let line = self.scanner.line;
        let mut outs = Vec::new();
        self.read_paths_to(&mut outs)?;
        let explicit_outs = outs.len();

        // Implicit outputs, after a single '|'.
        if self.scanner.peek() == '|' {
            self.scanner.next();
            self.read_paths_to(&mut outs)?;
        }

        self.scanner.expect(':')?;
        self.skip_spaces();
        let rule = self.read_ident()?;

        let mut ins = Vec::new();
        self.read_paths_to(&mut ins)?;
        let explicit_ins = ins.len();

        // Implicit inputs after '|', unless the second '|' of a '||'.
        if self.scanner.peek() == '|' {
            self.scanner.next();
            if self.scanner.peek() == '|' {
                self.scanner.back();
            } else {
                self.read_paths_to(&mut ins)?;
            }
        }
        let implicit_ins = ins.len() - explicit_ins;

        // Order-only inputs after '||'.
        if self.scanner.peek() == '|' {
            self.scanner.next();
            self.scanner.expect('|')?;
            self.read_paths_to(&mut ins)?;
        }
        let order_only_ins = ins.len() - implicit_ins - explicit_ins;

        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        let vars = self.read_scoped_vars(|_| true)?;
        Ok(Build {
            rule,
            line,
            outs,
            explicit_outs,
            ins,
            explicit_ins,
            implicit_ins,
            order_only_ins,
            vars,
        })
    }

    fn read_default(&mut self) -> ParseResult<Vec<EvalString<&'text str>>> {
        let mut defaults = Vec::new();
        self.read_paths_to(&mut defaults)?;
        if defaults.is_empty() {
            return self.scanner.parse_error("expected path");
        }
        self.scanner.skip('\r');
        self.scanner.expect('\n')?;
        Ok(defaults)
    }

    fn skip_comment(&mut self) -> ParseResult<()> {
        loop {
            match self.scanner.read() {
                '\0' => {
                    self.scanner.back();
                    return Ok(());
                }
                '\n' => return Ok(()),
                _ => {}
            }
        }
    }

    /// Read an identifier -- rule name, pool name, variable name, etc.
    fn read_ident(&mut self) -> ParseResult<&'text str> {
        let start = self.scanner.ofs;
        while matches!(
            self.scanner.read(),
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.'
        ) {}
        self.scanner.back();
        let end = self.scanner.ofs;
        if end == start {
            return self.scanner.parse_error("failed to scan ident");
        }
        Ok(self.scanner.slice(start, end))
    }

    /// Reads an EvalString.  Stops at a newline, and additionally at
    /// ' ', ':', or '|' when `stop_at_path_separators` is set, without
    /// consuming the stopping character.
    fn read_eval(&mut self, stop_at_path_separators: bool) -> ParseResult<EvalString<&'text str>> {
        self.eval_buf.clear();
        let mut ofs = self.scanner.ofs;
        let end = loop {
            match self.scanner.read() {
                '\0' => return self.scanner.parse_error("unexpected EOF"),
                ' ' | ':' | '|' if stop_at_path_separators => {
                    self.scanner.back();
                    break self.scanner.ofs;
                }
                '\n' => {
                    self.scanner.back();
                    break self.scanner.ofs;
                }
                '\r' if self.scanner.peek() == '\n' => {
                    self.scanner.back();
                    break self.scanner.ofs;
                }
                '$' => {
                    let end = self.scanner.ofs - 1;
                    if end > ofs {
                        self.eval_buf
                            .push(EvalPart::Literal(self.scanner.slice(ofs, end)));
                    }
                    let escape = self.read_escape()?;
                    self.eval_buf.push(escape);
                    ofs = self.scanner.ofs;
                }
                _ => {}
            }
        };
        if end > ofs {
            self.eval_buf
                .push(EvalPart::Literal(self.scanner.slice(ofs, end)));
        }
        if self.eval_buf.is_empty() {
            return self.scanner.parse_error("expected a string");
        }
        Ok(EvalString::new(self.eval_buf.clone()))
    }

    /// Read a variable name as found after a '$' in an eval.  Unlike a
    /// general ident this disallows '.', so that `$bar.d` parses as a
    /// reference to `$bar`.
    fn read_simple_varname(&mut self) -> ParseResult<&'text str> {
        let start = self.scanner.ofs;
        while matches!(self.scanner.read(), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-') {}
        self.scanner.back();
        let end = self.scanner.ofs;
        if end == start {
            return self.scanner.parse_error("failed to scan variable name");
        }
        Ok(self.scanner.slice(start, end))
    }

    /// Read and interpret the text following a '$' escape character.
    fn read_escape(&mut self) -> ParseResult<EvalPart<&'text str>> {
        Ok(match self.scanner.read() {
            '\n' | '\r' => {
                // Line continuation; any indent on the next line is eaten.
                self.scanner.skip_spaces();
                EvalPart::Literal(self.scanner.slice(0, 0))
            }
            ' ' | '$' | ':' => {
                EvalPart::Literal(self.scanner.slice(self.scanner.ofs - 1, self.scanner.ofs))
            }
            '{' => {
                let start = self.scanner.ofs;
                loop {
                    match self.scanner.read() {
                        '\0' => return self.scanner.parse_error("unexpected EOF"),
                        '}' => break,
                        _ => {}
                    }
                }
                let end = self.scanner.ofs - 1;
                EvalPart::VarRef(self.scanner.slice(start, end))
            }
            _ => {
                // '$' followed by a variable name.
                self.scanner.back();
                let var = self.read_simple_varname()?;
                EvalPart::VarRef(var)
            }
        })
    }

    fn skip_spaces(&mut self) {
        loop {
            match self.scanner.read() {
                ' ' => {}
                '$' => {
                    if self.scanner.peek() != '\n' {
                        self.scanner.back();
                        return;
                    }
                    self.scanner.next();
                }
                _ => {
                    self.scanner.back();
                    return;
                }
            }
        }
    }
}

//! Chrome trace_event output for `-d trace`, to visualize where build time
//! goes.  The trace is an explicit context value owned by the front end and
//! threaded to the few places that emit events; None means tracing is off.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

pub struct Trace {
    start: Instant,
    w: BufWriter<File>,
}

impl Trace {
    pub fn open(path: &str) -> std::io::Result<Trace> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "[")?;
        Ok(Trace {
            start: Instant::now(),
            w,
        })
    }

    fn write_complete(&mut self, name: &str, start: Instant, end: Instant) -> std::io::Result<()> {
        write!(
            self.w,
            "{{ \"pid\": 0, \"name\": {:?}, \"ts\": {}, \"ph\": \"X\", \"dur\": {} }}",
            name,
            start.duration_since(self.start).as_micros(),
            end.duration_since(start).as_micros()
        )
    }

    fn scope_impl<T>(&mut self, name: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.write_complete(name, start, Instant::now())
            .and_then(|_| writeln!(self.w, ","))
            .unwrap();
        result
    }

    pub fn close(&mut self) -> std::io::Result<()> {
        self.write_complete("main", self.start, Instant::now())?;
        writeln!(self.w, "]")?;
        self.w.flush()
    }
}

/// Run `f`, timing it as a trace event when tracing is enabled.
pub fn scope<T>(trace: &mut Option<Trace>, name: &'static str, f: impl FnOnce() -> T) -> T {
    match trace {
        None => f(),
        Some(trace) => trace.scope_impl(name, f),
    }
}

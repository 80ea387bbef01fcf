pub mod canon;
pub mod db;
pub mod densemap;
pub mod depfile;
pub mod eval;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod load;
pub mod parse;
pub mod process;
#[cfg(unix)]
mod process_posix;
pub mod progress;
pub mod run;
pub mod scanner;
mod signal;
pub mod smallmap;
pub mod task;
mod terminal;
pub mod trace;
pub mod work;

#[cfg(not(windows))]
use jemallocator::Jemalloc;

#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

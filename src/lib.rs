pub mod db;
mod depfile;
pub mod fs;
pub mod graph;
pub mod load;
pub mod process;
pub mod progress;
pub mod rebuild;
pub mod run;
mod scanner;
pub mod unit;
pub mod work;

#[cfg(not(windows))]
use jemallocator::Jemalloc;

#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

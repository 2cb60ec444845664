//! Structured reporting of construction runs.
//!
//! Facts about a run (sizes, round counts, timings) are collected into a
//! thread local JSON object through the [`report!`] macro and dumped to
//! standard output when the guard returned by [`enable_reporting`] is
//! dropped. The timing helpers additionally print to standard error as the
//! phases go by, so long runs stay observable.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::time::{Duration, Instant};

pub use serde_json::json;

thread_local! {
    static REPORTER: RefCell<Option<Map<String, Value>>> = RefCell::new(None);
}

/// Record a value under `key` in the run report. Overwrites earlier values
/// for the same key. A no-op when reporting is not enabled.
pub fn report_value(key: &str, val: Value) {
    REPORTER.with(|reporter| {
        if let Some(map) = reporter.borrow_mut().as_mut() {
            map.insert(key.to_string(), val);
        }
    });
}

#[macro_export]
macro_rules! report {
    ($key:expr, $($json:tt)+) => {
        $crate::report::report_value($key, $crate::report::json!($($json)+))
    };
}

/// Guard returned by [`enable_reporting`]. Dumps the collected report as a
/// single JSON line on drop.
#[must_use]
pub struct Reporter(());

impl Drop for Reporter {
    fn drop(&mut self) {
        REPORTER.with(|reporter| {
            if let Some(map) = reporter.borrow_mut().take() {
                println!("{}", Value::Object(map));
            }
        });
    }
}

pub fn enable_reporting(program: &str) -> Reporter {
    REPORTER.with(|reporter| *reporter.borrow_mut() = Some(Map::new()));
    report!("program", program);
    Reporter(())
}

/// Measure how long the given closure takes, print the time to standard
/// error, record it in the run report and return the closure's result.
pub fn report_time<Out, F: FnOnce() -> Out>(name: &str, f: F) -> Out {
    eprintln!("starting {}", name);
    let (res, duration) = measure(f);
    let ms = duration.as_secs_f64() * 1000.0;
    eprintln!("{} done - took: {}ms", name, ms);
    report_value(&format!("{}_running_time_ms", name.replace(' ', "_")), json!(ms));
    res
}

/// Measure how long the given closure takes and return its result together
/// with the elapsed time.
pub fn measure<Out, F: FnOnce() -> Out>(f: F) -> (Out, Duration) {
    let start = Instant::now();
    let res = f();
    (res, start.elapsed())
}

/// A stopwatch for measuring several spans from one starting point.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Timer {
        Timer { start: Instant::now() }
    }

    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    pub fn passed(&self) -> Duration {
        self.start.elapsed()
    }
}

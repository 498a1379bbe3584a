/*!
 * Kernel Configuration
 *
 * Environment variables:
 * - KERNEL_FRAMES: physical frames in the frame pool
 * - KERNEL_MAX_PROCESSES: cap on simultaneously existing process records
 * - KERNEL_STACK_PAGES: pages in each user stack
 * - KERNEL_TRACE_JSON: JSON log output ("1" or "true")
 */

use crate::core::limits::{DEFAULT_MAX_PROCESSES, DEFAULT_STACK_PAGES, DEFAULT_TOTAL_FRAMES};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    pub total_frames: usize,
    pub max_processes: usize,
    pub stack_pages: usize,
    pub trace_json: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            total_frames: DEFAULT_TOTAL_FRAMES,
            max_processes: DEFAULT_MAX_PROCESSES,
            stack_pages: DEFAULT_STACK_PAGES,
            trace_json: false,
        }
    }
}

impl KernelConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            total_frames: parse_or(&lookup, "KERNEL_FRAMES", defaults.total_frames),
            max_processes: parse_or(&lookup, "KERNEL_MAX_PROCESSES", defaults.max_processes),
            stack_pages: parse_or(&lookup, "KERNEL_STACK_PAGES", defaults.stack_pages),
            trace_json: lookup("KERNEL_TRACE_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.trace_json),
        }
    }

    pub fn with_total_frames(mut self, frames: usize) -> Self {
        self.total_frames = frames;
        self
    }

    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    pub fn with_stack_pages(mut self, pages: usize) -> Self {
        self.stack_pages = pages;
        self
    }

    pub fn with_trace_json(mut self, json: bool) -> Self {
        self.trace_json = json;
        self
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "ignoring unparsable setting");
            default
        }),
    }
}

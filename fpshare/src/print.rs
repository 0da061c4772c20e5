// Copyright (c) 2026 FnPool Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use chrono::prelude::*;
use lazy_static::lazy_static;
use spin::RwLock;

lazy_static! {
    pub static ref LOG: Log = Log::New();
}

/// Global switch for debug-level logging; used by the `debug!` macro.
pub static DEBUG_LOG_ENABLED: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn debug_logging_enabled() -> bool {
    return DEBUG_LOG_ENABLED.load(Ordering::Relaxed);
}

#[inline]
pub fn set_debug_logging(enable: bool) {
    DEBUG_LOG_ENABLED.store(enable, Ordering::SeqCst);
}

pub const LOG_FILE_ENV: &str = "FNPOOL_LOG_FILE";
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn ThreadId() -> i32 {
    unsafe {
        return libc::gettid();
    }
}

pub struct Log {
    pub file: Mutex<Option<std::fs::File>>,
    pub serviceName: RwLock<String>,
}

impl Log {
    pub fn New() -> Self {
        let file = match std::env::var(LOG_FILE_ENV) {
            Ok(path) if path.len() > 0 => match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(f) => Some(f),
                Err(e) => {
                    eprintln!("Log open {} fail {:?}, fallback to stderr", &path, e);
                    None
                }
            },
            _ => None,
        };

        return Self {
            file: Mutex::new(file),
            serviceName: RwLock::new("".to_owned()),
        };
    }

    pub fn SetServiceName(&self, name: &str) {
        *self.serviceName.write() = name.to_owned();
    }

    pub fn ServiceName(&self) -> String {
        return self.serviceName.read().clone();
    }

    pub fn Print(&self, level: &str, str: &str) {
        let now = Local::now();
        let formatted = now.format(TIME_FORMAT).to_string();

        let line = format!(
            "{}[{}] [{}/{}] {}\n",
            self.ServiceName(),
            level,
            ThreadId(),
            formatted,
            str
        );

        match &mut *self.file.lock().unwrap() {
            Some(f) => {
                f.write_all(line.as_bytes()).ok();
            }
            None => {
                std::io::stderr().write_all(line.as_bytes()).ok();
            }
        }
    }
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ({
        let s = &format!($($arg)*);
        $crate::print::LOG.Print("ERROR", &s);
    });
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ({
        let s = &format!($($arg)*);
        $crate::print::LOG.Print("WARN", &s);
    });
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ({
        let s = &format!($($arg)*);
        $crate::print::LOG.Print("INFO", &s);
    });
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ({
        if $crate::print::debug_logging_enabled() {
            let s = &format!($($arg)*);
            $crate::print::LOG.Print("DEBUG", &s);
        }
    });
}

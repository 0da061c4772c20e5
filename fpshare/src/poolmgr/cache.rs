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

use std::fmt::Debug;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Short-TTL lookaside cache; cuts repeated orchestrator lookups on the
/// invocation hot path.
#[derive(Debug)]
pub struct TtlCache<T: Clone + Debug> {
    cache: DashMap<String, (T, Instant)>,
    ttl: Duration,
}

impl<T: Clone + Debug> TtlCache<T> {
    pub fn New(ttl: Duration) -> Self {
        return Self {
            cache: DashMap::new(),
            ttl: ttl,
        };
    }

    pub fn Get(&self, key: &str) -> Option<T> {
        match self.cache.get(key) {
            None => return None,
            Some(entry) => {
                if entry.1.elapsed() < self.ttl {
                    return Some(entry.0.clone());
                }
            }
        }

        self.cache.remove(key);
        return None;
    }

    pub fn Set(&self, key: &str, val: T) {
        self.cache.insert(key.to_owned(), (val, Instant::now()));
    }

    pub fn Remove(&self, key: &str) {
        self.cache.remove(key);
    }

    pub fn Len(&self) -> usize {
        return self.cache.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn TestTtlCacheExpiry() {
        let cache = TtlCache::<u32>::New(Duration::from_millis(50));
        cache.Set("a", 1);
        assert_eq!(cache.Get("a"), Some(1));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.Get("a"), None);
        assert_eq!(cache.Len(), 0);
    }
}

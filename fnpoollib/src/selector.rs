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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label/annotation set attached to every DataObject. A label selector is
/// just another Labels value; an object matches when it carries every
/// key/value pair of the selector.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(pub BTreeMap<String, String>);

impl From<BTreeMap<String, String>> for Labels {
    fn from(item: BTreeMap<String, String>) -> Self {
        return Self(item);
    }
}

impl Labels {
    pub fn New() -> Self {
        return Self(BTreeMap::new());
    }

    pub fn NewFromSlice(pairs: &[(&str, &str)]) -> Self {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }

        return Self(map);
    }

    pub fn Get(&self, key: &str) -> Option<String> {
        return self.0.get(key).cloned();
    }

    pub fn Set(&mut self, key: &str, val: &str) {
        self.0.insert(key.to_owned(), val.to_owned());
    }

    pub fn Contains(&self, key: &str) -> bool {
        return self.0.contains_key(key);
    }

    pub fn Remove(&mut self, key: &str) -> Option<String> {
        return self.0.remove(key);
    }

    pub fn Merge(&mut self, other: &Labels) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    // true iff self carries every pair of the selector. The empty
    // selector matches everything.
    pub fn Matches(&self, selector: &Labels) -> bool {
        for (k, v) in &selector.0 {
            match self.0.get(k) {
                Some(val) if val == v => (),
                _ => return false,
            }
        }

        return true;
    }

    pub fn Len(&self) -> usize {
        return self.0.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn TestLabelsMatches() {
        let labels = Labels::NewFromSlice(&[("a", "1"), ("b", "2"), ("c", "3")]);

        assert!(labels.Matches(&Labels::New()));
        assert!(labels.Matches(&Labels::NewFromSlice(&[("a", "1")])));
        assert!(labels.Matches(&Labels::NewFromSlice(&[("a", "1"), ("c", "3")])));
        assert!(!labels.Matches(&Labels::NewFromSlice(&[("a", "2")])));
        assert!(!labels.Matches(&Labels::NewFromSlice(&[("d", "4")])));
    }
}

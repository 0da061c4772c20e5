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

use once_cell::sync::OnceCell;
use rand::Rng;

// identity of this manager process, stamped on adopted/created objects
pub static INSTANCE_ID: OnceCell<String> = OnceCell::new();

pub fn NewUid() -> String {
    let mut rng = rand::thread_rng();
    let mut uid = String::with_capacity(16);
    for _ in 0..16 {
        let v: u8 = rng.gen_range(0..16);
        uid.push(char::from_digit(v as u32, 16).unwrap());
    }

    return uid;
}

pub fn NewSuffix(len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let mut s = String::with_capacity(len);
    for _ in 0..len {
        let idx: usize = rng.gen_range(0..CHARS.len());
        s.push(CHARS[idx] as char);
    }

    return s;
}

pub fn ShortUid(uid: &str) -> &str {
    if uid.len() <= 8 {
        return uid;
    }

    return &uid[..8];
}

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

#[derive(Debug)]
pub enum Error {
    CommonError(String),
    Exist(String),
    NotExist(String),
    SerdeJsonError(serde_json::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(item: serde_json::Error) -> Self {
        return Self::SerdeJsonError(item);
    }
}

impl Error {
    pub fn IsExist(&self) -> bool {
        match self {
            Error::Exist(_) => return true,
            _ => return false,
        }
    }

    pub fn IsNotExist(&self) -> bool {
        match self {
            Error::NotExist(_) => return true,
            _ => return false,
        }
    }
}

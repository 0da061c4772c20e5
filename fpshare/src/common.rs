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
    // duplicate entry name in the function service cache
    NameExists(String),
    SpecializationFailure(String),
    TooManyRequests(String),
    Timeout,
    ConfigError(String),
    SerdeJsonError(serde_json::Error),
    ReqwestError(reqwest::Error),
    StdIOErr(std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(item: serde_json::Error) -> Self {
        return Self::SerdeJsonError(item);
    }
}

impl From<reqwest::Error> for Error {
    fn from(item: reqwest::Error) -> Self {
        return Self::ReqwestError(item);
    }
}

impl From<std::io::Error> for Error {
    fn from(item: std::io::Error) -> Self {
        return Self::StdIOErr(item);
    }
}

impl From<fnpoollib::common::Error> for Error {
    fn from(item: fnpoollib::common::Error) -> Self {
        match item {
            fnpoollib::common::Error::CommonError(s) => return Self::CommonError(s),
            fnpoollib::common::Error::Exist(s) => return Self::Exist(s),
            fnpoollib::common::Error::NotExist(s) => return Self::NotExist(s),
            fnpoollib::common::Error::SerdeJsonError(e) => return Self::SerdeJsonError(e),
        }
    }
}

impl Error {
    pub fn IsNotExist(&self) -> bool {
        match self {
            Error::NotExist(_) => return true,
            _ => return false,
        }
    }

    pub fn IsNameExists(&self) -> bool {
        match self {
            Error::NameExists(_) => return true,
            _ => return false,
        }
    }

    pub fn IsSpecializationFailure(&self) -> bool {
        match self {
            Error::SpecializationFailure(_) => return true,
            _ => return false,
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout the chassis manager.

use std::convert;

use aal::DriverError;

pub type ChassisResult<T> = Result<T, ChassisError>;

#[derive(Debug, thiserror::Error)]
pub enum ChassisError {
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("Driver error: {0}")]
    Driver(DriverError),
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
    #[error("Not initialized: {0}")]
    NotInitialized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Reboot required: {0}")]
    RebootRequired(String),
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("{}", fmt_aggregate(.0))]
    Aggregate(Vec<ChassisError>),
}

fn fmt_aggregate(errors: &[ChassisError]) -> String {
    let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} errors: [{}]", errors.len(), msgs.join("; "))
}

/// The broad class of a [`ChassisError`], as seen by a caller deciding what to
/// do about it.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidParam,
    NotInitialized,
    NotFound,
    RebootRequired,
    Unimplemented,
    Internal,
}

impl ChassisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChassisError::InvalidParam(_) => ErrorKind::InvalidParam,
            ChassisError::NotInitialized(_) => ErrorKind::NotInitialized,
            ChassisError::NotFound(_) => ErrorKind::NotFound,
            ChassisError::RebootRequired(_) => ErrorKind::RebootRequired,
            ChassisError::Unimplemented(_) => ErrorKind::Unimplemented,
            ChassisError::Driver(DriverError::InvalidArg(_)) => {
                ErrorKind::InvalidParam
            }
            ChassisError::Driver(_) => ErrorKind::Internal,
            ChassisError::Io(_) => ErrorKind::Internal,
            ChassisError::Internal(_) => ErrorKind::Internal,
            ChassisError::Aggregate(errs) => errs
                .first()
                .map(|e| e.kind())
                .unwrap_or(ErrorKind::Internal),
        }
    }
}

impl convert::From<std::io::Error> for ChassisError {
    fn from(err: std::io::Error) -> Self {
        ChassisError::Io(err)
    }
}

impl convert::From<DriverError> for ChassisError {
    fn from(err: DriverError) -> Self {
        ChassisError::Driver(err)
    }
}

impl convert::From<toml::de::Error> for ChassisError {
    fn from(err: toml::de::Error) -> Self {
        ChassisError::InvalidParam(err.to_string())
    }
}

/// Collects the errors from a series of independent steps, so that one
/// failing step doesn't stop the rest from being attempted.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<ChassisError>);

impl ErrorList {
    pub fn new() -> Self {
        ErrorList(Vec::new())
    }

    /// Record an error.  An aggregate from a nested step is flattened into
    /// this list.
    pub fn push(&mut self, err: ChassisError) {
        match err {
            ChassisError::Aggregate(errs) => self.0.extend(errs),
            e => self.0.push(e),
        }
    }

    /// Record the error, if any, and hand back the success value.
    pub fn check<T>(&mut self, result: ChassisResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result(mut self) -> ChassisResult<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(ChassisError::Aggregate(self.0)),
        }
    }
}

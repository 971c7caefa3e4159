//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PolicyResult<T> {
    Accept(T),
    Reject,
}

// Default policy type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultPolicyType {
    #[default]
    AcceptRoute,
    RejectRoute,
}

// ===== impl PolicyResult =====

impl<T> PolicyResult<T> {
    pub fn is_accept(&self) -> bool {
        matches!(self, PolicyResult::Accept(_))
    }

    // Converts the result into an `Option`, mapping rejections to `None`.
    pub fn accepted(self) -> Option<T> {
        match self {
            PolicyResult::Accept(value) => Some(value),
            PolicyResult::Reject => None,
        }
    }
}

impl<T> From<Option<T>> for PolicyResult<T> {
    fn from(value: Option<T>) -> PolicyResult<T> {
        match value {
            Some(value) => PolicyResult::Accept(value),
            None => PolicyResult::Reject,
        }
    }
}

// ===== impl DefaultPolicyType =====

impl DefaultPolicyType {
    // Returns the result of applying the default policy to a route that
    // didn't match any policy statement.
    pub fn apply<T>(&self, value: T) -> PolicyResult<T> {
        match self {
            DefaultPolicyType::AcceptRoute => PolicyResult::Accept(value),
            DefaultPolicyType::RejectRoute => PolicyResult::Reject,
        }
    }
}

// ap-reboot - reboot access points in tagged Meraki networks
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Classification of dashboard responses.
//!
//! Every mutating call (reboot, tag update) goes through [`handle`], which
//! prints a one-line verdict and hands back the parsed payload. Nothing here
//! returns an error: a failed call is reported and the caller moves on.

use crate::client::ResponseData;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        message: String,
        data: Option<Value>,
    },
    Failure {
        status: u16,
        message: String,
        /// The body's `errors` array when present, otherwise the whole body.
        details: Option<Value>,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Success { message, .. } | Outcome::Failure { message, .. } => message,
        }
    }
}

/// Classifies `response` for an operation on `call_type` (e.g. `"Device"`),
/// printing the verdict to stdout unless `suppress_print` is set.
pub fn handle(response: ResponseData, call_type: &str, suppress_print: bool) -> Outcome {
    let outcome = classify(response, call_type);

    match &outcome {
        Outcome::Success { message, .. } => info!(call_type, "{message}"),
        Outcome::Failure {
            status,
            message,
            details,
        } => warn!(
            call_type,
            status,
            details = details.as_ref().map(serde_json::Value::to_string).unwrap_or_default(),
            "{message}"
        ),
    }

    if !suppress_print {
        println!("{}", outcome.message());
        if let Outcome::Failure {
            details: Some(details),
            ..
        } = &outcome
        {
            println!("{details}");
        }
    }

    outcome
}

fn classify(response: ResponseData, call_type: &str) -> Outcome {
    let ResponseData { status, body, json } = response;
    let has_data = json.is_some();
    let errors = json.as_ref().and_then(|j| j.get("errors")).cloned();

    let success = |verb: &str| {
        let message = if has_data {
            format!("{call_type} {verb} - See returned data for results")
        } else {
            format!("{call_type} {verb}")
        };
        Outcome::Success {
            message,
            data: json.clone(),
        }
    };

    let failure = |label: String| {
        let details = match (&errors, &json) {
            (Some(errors), _) => Some(errors.clone()),
            (None, Some(json)) => Some(json.clone()),
            (None, None) if !body.trim().is_empty() => Some(Value::String(body.clone())),
            (None, None) => None,
        };
        let message = if details.is_some() {
            format!("{label} - See returned data for error details")
        } else {
            format!("{label} - No additional error data available")
        };
        Outcome::Failure {
            status,
            message,
            details,
        }
    };

    match status {
        200 | 202 => success("Operation Successful"),
        201 => success("Added Successfully"),
        204 => success("Deleted Successfully"),
        s if (200..300).contains(&s) => success("Operation Successful"),
        400 => failure("Bad Request".to_string()),
        401 => failure("Unauthorized Access".to_string()),
        404 => failure("Resource Not Found".to_string()),
        500 => failure("HTTP 500 - Server Error".to_string()),
        other => failure(format!("HTTP Status Code: {other}")),
    }
}

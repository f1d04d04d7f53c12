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

//! Dashboard entities read by the reboot run.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A dashboard network as returned by `GET /organizations/{orgId}/networks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `None` when the API reports no tags at all.
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Option<Vec<String>>,
}

impl Network {
    /// Exact tag membership. A network without tags never matches.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .map(|tags| tags.iter().any(|t| t == tag))
            .unwrap_or(false)
    }

    /// Tags left over once `tag` is removed.
    pub fn tags_without(&self, tag: &str) -> Vec<String> {
        self.tags
            .iter()
            .flatten()
            .filter(|t| t.as_str() != tag)
            .cloned()
            .collect()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A device as returned by `GET /networks/{networkId}/devices`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub serial: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Device {
    /// Substring match on the model, e.g. `MR` hits `MR42` and `MR33`.
    pub fn model_contains(&self, needle: &str) -> bool {
        self.model
            .as_deref()
            .map(|m| m.contains(needle))
            .unwrap_or(false)
    }
}

/// v0 reports tags as one space-separated string (`" ap_reboot lab "`),
/// later API versions as an array. Both end up as a list of tags.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let tags = match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.split_whitespace().map(str::to_string).collect()),
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "unexpected tags value: {other}"
            )));
        }
    };
    Ok(tags)
}

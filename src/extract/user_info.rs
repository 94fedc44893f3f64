//! Multi-step user-info extraction.
//!
//! A [`UserInfoConfig`] lists fetch steps in order. Each step names the page to
//! request and the fields its response feeds. Steps may assert that a field
//! they extract equals a value captured by an earlier step; a failed assertion
//! stops the sequence but keeps what earlier steps captured.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::document::{Document, ResponseType};
use super::error::ExtractError;
use super::selector::{FieldExtractor, FieldSelector};
use crate::definition::DefinitionError;
use crate::model::UserInfo;
use crate::request::{Method, RequestBody, SiteRequest};
use crate::units::parse_number;

/// Declarative user-info configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfoConfig {
    /// Field keys that keep the last successfully parsed value instead of the first.
    #[serde(default)]
    pub pick_last: Vec<String>,
    /// Fetch steps, executed in order.
    pub process: Vec<FetchStepSpec>,
    /// Field key to selector mapping shared by all steps.
    #[serde(default)]
    pub selectors: HashMap<String, FieldSelector>,
}

/// One fetch step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchStepSpec {
    /// Request to issue; `{key}` placeholders are filled from captured fields.
    pub request: RequestSpec,
    /// How to parse the response.
    #[serde(default)]
    pub response_type: ResponseType,
    /// Field keys this step's response feeds.
    pub fields: Vec<String>,
    /// Field in this step -> field captured by an earlier step that it must equal.
    #[serde(default)]
    pub assertion: BTreeMap<String, String>,
}

/// Request template for a fetch step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Path relative to the site base URL, with optional query string.
    pub path: String,
    #[serde(default)]
    pub method: Method,
    /// Form body fields (POST).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub form: BTreeMap<String, String>,
    /// JSON body (POST).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    /// Extra headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl RequestSpec {
    /// Builds a concrete request, substituting `{key}` placeholders from `vars`.
    ///
    /// # Errors
    ///
    /// Returns `FieldNotFound` naming the first placeholder without a captured value.
    pub fn build(&self, vars: &HashMap<String, String>) -> Result<SiteRequest, ExtractError> {
        let mut request = SiteRequest {
            method: self.method,
            path: fill_placeholders(&self.path, vars)?,
            ..SiteRequest::default()
        };
        if let Some(json) = &self.json {
            let text = fill_placeholders(&json.to_string(), vars)?;
            let value = serde_json::from_str(&text).unwrap_or_else(|_| json.clone());
            request.body = Some(RequestBody::Json(value));
        } else if !self.form.is_empty() {
            let pairs = self
                .form
                .iter()
                .map(|(k, v)| Ok((k.clone(), fill_placeholders(v, vars)?)))
                .collect::<Result<Vec<_>, ExtractError>>()?;
            request.body = Some(RequestBody::Form(pairs));
        }
        for (name, value) in &self.headers {
            request
                .headers
                .push((name.clone(), fill_placeholders(value, vars)?));
        }
        Ok(request)
    }
}

fn fill_placeholders(
    template: &str,
    vars: &HashMap<String, String>,
) -> Result<String, ExtractError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let key = &rest[start + 1..start + len];
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            out.push_str(&rest[..=start]);
            rest = &rest[start + 1..];
            continue;
        }
        let value = vars.get(key).ok_or_else(|| ExtractError::not_found(key))?;
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// A compiled fetch step.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    /// Request template.
    pub request: RequestSpec,
    /// Response type.
    pub response_type: ResponseType,
    fields: Vec<FieldExtractor>,
    assertion: Vec<(String, String)>,
}

/// A compiled [`UserInfoConfig`].
#[derive(Debug, Clone)]
pub struct UserInfoPlan {
    steps: Vec<CompiledStep>,
    pick_last: HashSet<String>,
}

impl UserInfoPlan {
    /// Compiles every step's fields against the shared selector map.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::MissingSelector`] when a step lists a field
    /// with no selector, or any selector/filter compile error.
    pub fn compile(
        definition_id: &str,
        config: &UserInfoConfig,
        offset: FixedOffset,
    ) -> Result<Self, DefinitionError> {
        let steps = config
            .process
            .iter()
            .map(|step| {
                let fields = step
                    .fields
                    .iter()
                    .map(|key| {
                        let spec = config.selectors.get(key).ok_or_else(|| {
                            DefinitionError::MissingSelector {
                                id: definition_id.to_string(),
                                field: key.clone(),
                            }
                        })?;
                        FieldExtractor::compile(key, spec, step.response_type, offset)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CompiledStep {
                    request: step.request.clone(),
                    response_type: step.response_type,
                    fields,
                    assertion: step
                        .assertion
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, DefinitionError>>()?;

        Ok(Self {
            steps,
            pick_last: config.pick_last.iter().cloned().collect(),
        })
    }

    /// Compiled steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[CompiledStep] {
        &self.steps
    }
}

/// Accumulates field values across the steps of one user-info run.
#[derive(Debug)]
pub struct UserInfoCollector<'p> {
    plan: &'p UserInfoPlan,
    values: HashMap<String, String>,
}

impl<'p> UserInfoCollector<'p> {
    /// Starts an empty run over `plan`.
    #[must_use]
    pub fn new(plan: &'p UserInfoPlan) -> Self {
        Self {
            plan,
            values: HashMap::new(),
        }
    }

    /// Builds the request for `step` from the values captured so far.
    ///
    /// # Errors
    ///
    /// Returns `FieldNotFound` when a placeholder has no captured value.
    pub fn request_for(&self, step: &CompiledStep) -> Result<SiteRequest, ExtractError> {
        step.request.build(&self.values)
    }

    /// Extracts `step`'s fields from `document` and merges them.
    ///
    /// Fields that fail to extract are skipped (left at their zero value).
    /// Assertions are checked before anything from this step is merged.
    ///
    /// # Errors
    ///
    /// Returns `AssertionFailed` when an asserted field is missing or differs
    /// from the earlier captured value.
    pub fn absorb(&mut self, step: &CompiledStep, document: &Document) -> Result<(), ExtractError> {
        let mut local = HashMap::new();
        for field in &step.fields {
            match field.extract(document) {
                Ok(value) => {
                    local.insert(field.name().to_string(), value);
                }
                Err(error) => debug!(field = field.name(), error = %error, "field not resolved"),
            }
        }

        for (field, prior) in &step.assertion {
            let actual = local.get(field);
            let expected = self.values.get(prior);
            if actual.is_none() || actual != expected {
                return Err(ExtractError::AssertionFailed {
                    field: field.clone(),
                    expected: expected.cloned().unwrap_or_default(),
                    actual: actual.cloned().unwrap_or_default(),
                });
            }
        }

        for (key, value) in local {
            if self.plan.pick_last.contains(&key) || !self.values.contains_key(&key) {
                self.values.insert(key, value);
            }
        }
        Ok(())
    }

    /// Captured values so far.
    #[must_use]
    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Maps captured values onto a [`UserInfo`]. Unknown keys are ignored.
    #[must_use]
    pub fn into_user_info(self, site: &str) -> UserInfo {
        let mut info = UserInfo {
            site: site.to_string(),
            ..UserInfo::default()
        };
        for (key, value) in &self.values {
            if !apply_user_field(&mut info, key, value) {
                debug!(field = %key, "captured field has no user-info slot");
            }
        }
        info.fill_ratio();
        info
    }
}

/// Writes one captured value into the matching [`UserInfo`] slot.
///
/// Returns false when `key` is not a known user-info field.
#[allow(clippy::cast_possible_truncation)]
pub fn apply_user_field(info: &mut UserInfo, key: &str, value: &str) -> bool {
    let number = || parse_number(value).unwrap_or(0.0);
    let integer = || number().round() as i64;
    match key {
        "id" => info.user_id = value.to_string(),
        "name" => info.username = value.to_string(),
        "uploaded" => info.uploaded = integer(),
        "downloaded" => info.downloaded = integer(),
        "ratio" => info.ratio = number(),
        "bonus" => info.bonus = number(),
        "levelName" => info.rank = value.to_string(),
        "levelId" => info.level_id = integer(),
        "joinTime" => info.join_date = integer(),
        "lastAccessTime" => info.last_access = integer(),
        "bonusPerHour" => info.bonus_per_hour = number(),
        "messageCount" => info.unread_messages = integer(),
        "messageTotal" => info.total_messages = integer(),
        "seeding" => info.seeder_count = integer(),
        "seedingSize" => info.seeder_size = integer(),
        "leeching" => info.leecher_count = integer(),
        "leechingSize" => info.leecher_size = integer(),
        _ => return false,
    }
    true
}

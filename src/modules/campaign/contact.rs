// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct ContactEntity {
    #[primary_key]
    pub address: String,
    /// Values substituted into `{{name}}` placeholders.
    pub personalization_fields: BTreeMap<String, String>,
}

impl ContactEntity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            personalization_fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.personalization_fields.insert(name.into(), value.into());
        self
    }
}

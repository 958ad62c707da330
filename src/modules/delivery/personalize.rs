// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use handlebars::{no_escape, Handlebars};

use crate::{
    modules::error::{code::ErrorCode, MailcastResult},
    raise_error,
};

/// Subject and HTML body after placeholder substitution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PersonalizedContent {
    pub subject: String,
    pub html_body: String,
}

/// Renders `{{field}}` placeholders from contact fields. Unknown fields
/// render as empty strings; only a template that does not parse fails.
pub struct Personalizer {
    subject: Handlebars<'static>,
    body: Handlebars<'static>,
}

impl Default for Personalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Personalizer {
    pub fn new() -> Self {
        let mut subject = Handlebars::new();
        subject.register_escape_fn(no_escape);
        Self {
            subject,
            body: Handlebars::new(),
        }
    }

    pub fn render(
        &self,
        subject_template: &str,
        body_template: &str,
        contact_address: &str,
        fields: &BTreeMap<String, String>,
    ) -> MailcastResult<PersonalizedContent> {
        let mut data = fields.clone();
        data.entry("email".to_string())
            .or_insert_with(|| contact_address.to_string());

        let subject = self
            .subject
            .render_template(subject_template, &data)
            .map_err(|e| {
                raise_error!(
                    format!("Handlebars 'subject' render error: {e}"),
                    ErrorCode::TemplateRenderFailed
                )
            })?;
        let html_body = self
            .body
            .render_template(body_template, &data)
            .map_err(|e| {
                raise_error!(
                    format!("Handlebars 'body' render error: {e}"),
                    ErrorCode::TemplateRenderFailed
                )
            })?;
        Ok(PersonalizedContent { subject, html_body })
    }
}

pub mod admin;
pub mod chat;
pub mod friends;
pub mod users;

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::attachments::Upload;
use crate::error::{ApiError, ApiResult};

/// A decoded multipart form: text fields by name, files in arrival order.
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: Vec<(String, Upload)>,
}

impl FormData {
    pub fn field(&self, name: &str) -> ApiResult<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ApiError::validation(format!("Please enter {name}")))
    }

    pub fn take_files(&mut self, name: &str) -> Vec<Upload> {
        let (matching, rest) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(field, _)| field == name);
        self.files = rest;
        matching.into_iter().map(|(_, upload)| upload).collect()
    }
}

pub async fn read_form(mut multipart: Multipart) -> ApiResult<FormData> {
    let mut form = FormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read file: {e}")))?;
                form.files.push((
                    name,
                    Upload {
                        file_name: Some(file_name),
                        bytes,
                    },
                ));
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read field: {e}")))?;
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

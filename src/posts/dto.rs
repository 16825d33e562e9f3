use serde::Deserialize;

use crate::attachments::MultipartForm;

/// Text part of a create/edit post form. Missing fields arrive empty.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PostFields {
    pub title: String,
    pub category: String,
    pub desc: String,
}

impl PostFields {
    pub fn trimmed(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            category: self.category.trim().to_string(),
            desc: self.desc.trim().to_string(),
        }
    }
}

impl From<&MultipartForm> for PostFields {
    fn from(form: &MultipartForm) -> Self {
        Self {
            title: form.text("title").to_string(),
            category: form.text("category").to_string(),
            desc: form.text("desc").to_string(),
        }
    }
}

use serde_json::Value as JsonValue;

use crate::error::{FlightError, Rejection};

pub const ROOT_ROW_ID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTag {
    Model,
    Error,
}

impl RowTag {
    pub fn tag_char(&self) -> Option<char> {
        match self {
            Self::Model => None,
            Self::Error => Some('E'),
        }
    }

    pub fn format_row(&self, row_id: u32, data: &str) -> String {
        match self.tag_char() {
            Some(tag) => format!("{}:{}{}\n", row_id, tag, data),
            None => format!("{}:{}\n", row_id, data),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowPayload {
    Model(JsonValue),
    Error(Rejection),
}

/// One newline-terminated line of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: u32,
    pub payload: RowPayload,
}

impl Row {
    pub fn model(id: u32, value: JsonValue) -> Self {
        Self { id, payload: RowPayload::Model(value) }
    }

    pub fn error(id: u32, rejection: Rejection) -> Self {
        Self { id, payload: RowPayload::Error(rejection) }
    }

    pub fn tag(&self) -> RowTag {
        match self.payload {
            RowPayload::Model(_) => RowTag::Model,
            RowPayload::Error(_) => RowTag::Error,
        }
    }

    pub fn to_line(&self) -> Result<String, FlightError> {
        let data = match &self.payload {
            RowPayload::Model(value) => serde_json::to_string(value),
            RowPayload::Error(rejection) => serde_json::to_string(rejection),
        }
        .map_err(|e| FlightError::not_serializable(format!("row {}: {}", self.id, e)))?;
        Ok(self.tag().format_row(self.id, &data))
    }

    pub fn parse(line: &str) -> Result<Self, FlightError> {
        let colon_pos = line.find(':').ok_or_else(|| {
            FlightError::malformed(format!("Invalid row format: missing colon in '{}'", line))
        })?;

        let (id_str, data_str) = line.split_at(colon_pos);
        let data_str = &data_str[1..];

        let id = id_str
            .parse::<u32>()
            .map_err(|e| FlightError::malformed(format!("Invalid row ID '{}': {}", id_str, e)))?;

        if let Some(error_data) = data_str.strip_prefix('E') {
            let rejection: Rejection = serde_json::from_str(error_data).map_err(|e| {
                FlightError::malformed(format!("Invalid error payload in row {}: {}", id, e))
            })?;
            return Ok(Self::error(id, rejection));
        }

        let value: JsonValue = serde_json::from_str(data_str)
            .map_err(|e| FlightError::malformed(format!("Invalid JSON in row {}: {}", id, e)))?;

        Ok(Self::model(id, value))
    }
}

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_derive::Serialize;
use tracing::debug;

use crate::error::ParseError;

/// Values extracted from one meter document. Anything absent stays at zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub instantaneous_demand_kw: f64,
    pub instantaneous_demand_w: f64,
    pub current_day_delivered_kwh: f64,
    pub previous_day_delivered_kwh: f64,
    pub lifetime_delivered_kwh: f64,
}

impl Reading {
    /// Compact JSON form, used when logging a cycle
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{self:?} ({e})"))
    }
}

struct TagField {
    tag: &'static str,
    assign: fn(&mut Reading, f64),
}

// The meter only reports demand in kW; the W field is derived from the same tag.
const TAG_FIELDS: [TagField; 4] = [
    TagField {
        tag: "instantaneousDemand",
        assign: |r, v| {
            r.instantaneous_demand_kw = v;
            r.instantaneous_demand_w = v;
        },
    },
    TagField {
        tag: "currDayDelivered",
        assign: |r, v| r.current_day_delivered_kwh = v,
    },
    TagField {
        tag: "previousDayDelivered",
        assign: |r, v| r.previous_day_delivered_kwh = v,
    },
    TagField {
        tag: "currSumDelivered",
        assign: |r, v| r.lifetime_delivered_kwh = v,
    },
];

struct Capture {
    field: usize,
    depth: usize,
    text: String,
}

/// Parses the `/rest/emeter` document.
///
/// The whole document is scanned so that malformed XML anywhere is rejected,
/// but only the first occurrence of each tag contributes to the reading.
pub fn parse(body: &str) -> Result<Reading, ParseError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut reading = Reading::default();
    let mut seen = [false; TAG_FIELDS.len()];
    let mut capture: Option<Capture> = None;
    let mut depth = 0usize;
    let mut root_seen = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 && root_seen {
                    return Err(ParseError::Structure(
                        "content after the root element".to_string(),
                    ));
                }
                root_seen = true;
                depth += 1;
                if capture.is_none() {
                    if let Some(field) = field_index(e.local_name().as_ref()) {
                        capture = Some(Capture {
                            field,
                            depth,
                            text: String::new(),
                        });
                    }
                }
            }
            Event::Empty(e) => {
                if depth == 0 && root_seen {
                    return Err(ParseError::Structure(
                        "content after the root element".to_string(),
                    ));
                }
                root_seen = true;
                if capture.is_none() {
                    if let Some(field) = field_index(e.local_name().as_ref()) {
                        store(&mut reading, &mut seen, field, "")?;
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                if depth == 0 {
                    return Err(ParseError::Structure(format!(
                        "text '{text}' outside of the root element"
                    )));
                }
                if let Some(c) = capture.as_mut() {
                    if c.depth == depth {
                        c.text.push_str(&text);
                    }
                }
            }
            Event::CData(t) => {
                if let Some(c) = capture.as_mut() {
                    if c.depth == depth {
                        c.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                    }
                }
            }
            Event::End(_) => {
                if let Some(c) = capture.take_if(|c| c.depth == depth) {
                    store(&mut reading, &mut seen, c.field, &c.text)?;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(ParseError::Structure("unclosed element".to_string()));
    }
    if !root_seen {
        return Err(ParseError::Structure("no root element".to_string()));
    }
    Ok(reading)
}

fn field_index(name: &[u8]) -> Option<usize> {
    TAG_FIELDS.iter().position(|f| f.tag.as_bytes() == name)
}

fn store(
    reading: &mut Reading,
    seen: &mut [bool; TAG_FIELDS.len()],
    field: usize,
    text: &str,
) -> Result<(), ParseError> {
    let entry = &TAG_FIELDS[field];
    if seen[field] {
        debug!("Ignoring repeated <{}> value '{}'", entry.tag, text.trim());
        return Ok(());
    }
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidValue {
            tag: entry.tag,
            value: text.trim().to_string(),
        })?;
    (entry.assign)(reading, value);
    seen[field] = true;
    Ok(())
}

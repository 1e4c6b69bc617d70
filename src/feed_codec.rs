use std::collections::HashMap;

/// Separates fields in the raw feed.
pub const FIELD_SEP: char = '¬';
/// Separates a key from its value inside one field.
pub const VALUE_SEP: char = '÷';
/// Prefix on a key that opens a new block.
pub const BLOCK_MARKER: char = '~';

/// One block of a decoded feed. `opener` is the marker key (without `~`)
/// that started the block; blocks collected before any marker have none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedBlock {
    pub opener: Option<String>,
    pub fields: HashMap<String, String>,
}

impl FeedBlock {
    fn opened_by(key: &str, value: &str) -> Self {
        let mut fields = HashMap::new();
        fields.insert(key.to_string(), value.to_string());
        Self {
            opener: Some(key.to_string()),
            fields,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Value of `key` if present and not blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_opened_by(&self, key: &str) -> bool {
        self.opener.as_deref() == Some(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decodes a delimiter-encoded feed into its blocks, in feed order.
///
/// Fields without a value separator are skipped. A key starting with the
/// block marker opens a new block; every other key lands in the most recent
/// block, last value winning. Blocks that end up without any key are dropped.
pub fn decode_blocks(raw: &str) -> Vec<FeedBlock> {
    let mut blocks = vec![FeedBlock::default()];

    for field in raw.split(FIELD_SEP) {
        let Some((key, value)) = split_field(field) else {
            continue;
        };
        if let Some(marked) = key.strip_prefix(BLOCK_MARKER) {
            if marked.is_empty() {
                continue;
            }
            blocks.push(FeedBlock::opened_by(marked, value));
            continue;
        }
        if key.is_empty() {
            continue;
        }
        if let Some(current) = blocks.last_mut() {
            current.fields.insert(key.to_string(), value.to_string());
        }
    }

    blocks.retain(|block| !block.is_empty());
    blocks
}

/// Flattens every field of the feed into one map, last value winning.
/// Used by single-record feeds such as the live score feed.
pub fn decode_flat(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for block in decode_blocks(raw) {
        out.extend(block.fields);
    }
    out
}

fn split_field(field: &str) -> Option<(&str, &str)> {
    let field = field.trim_matches(['\n', '\r']);
    let (key, _) = field.split_once(VALUE_SEP)?;
    // The value is whatever follows the last separator.
    let value = field.rsplit(VALUE_SEP).next().unwrap_or_default();
    Some((key.trim(), value))
}

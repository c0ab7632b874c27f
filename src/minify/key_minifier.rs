use std::collections::HashMap;

use geojson::{JsonObject, JsonValue};

use crate::geofile::feature::Properties;

const ID_KEY: &str = "id";

/// Assigns short, collision free codes to property keys.
///
/// A code, once assigned, is returned for every later occurrence of the same key, so the mapping
/// stays invertible for the lifetime of the minifier. Codes are chosen in this order:
/// - `id` for a key that lower-cases to `id`, unless `id` is already taken;
/// - the first non-whitespace character of the lower-cased key, unless already taken;
/// - the next free code of a bijective base-26 numbering (`a`, `b`, .., `z`, `aa`, `ab`, ..).
#[derive(Debug)]
pub struct KeyMinifier {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    // Codes in order of assignment, used to emit the key map deterministically.
    assigned: Vec<String>,
    counter: u64,
}

impl KeyMinifier {
    pub fn new() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
            assigned: Vec::new(),
            counter: 1,
        }
    }

    /// Return the code for `key`, assigning a new one on first sight.
    pub fn assign(&mut self, key: &str) -> String {
        if let Some(code) = self.forward.get(key) {
            return code.clone();
        }
        let code = match self.smart_key(key) {
            Some(code) => code,
            None => self.next_numbered_code(),
        };
        self.forward.insert(key.to_owned(), code.clone());
        self.reverse.insert(code.clone(), key.to_owned());
        self.assigned.push(code.clone());
        code
    }

    /// Original key behind `code`, if any.
    pub fn key_for(&self, code: &str) -> Option<&str> {
        self.reverse.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    /// Rename all keys of a property bag, keeping the values and their order.
    pub fn minify_properties(&mut self, properties: Properties) -> Properties {
        properties
            .into_iter()
            .map(|(key, value)| (self.assign(&key), value))
            .collect()
    }

    /// The code to original key mapping, in order of assignment.
    pub fn key_map(&self) -> JsonObject {
        self.assigned
            .iter()
            .filter_map(|code| {
                self.reverse
                    .get(code)
                    .map(|key| (code.clone(), JsonValue::String(key.clone())))
            })
            .collect()
    }

    fn is_claimed(&self, code: &str) -> bool {
        self.reverse.contains_key(code)
    }

    fn smart_key(&self, key: &str) -> Option<String> {
        let key = key.to_lowercase();
        if key == ID_KEY && !self.is_claimed(ID_KEY) {
            return Some(ID_KEY.to_owned());
        }
        let first_letter = key.trim().chars().next()?.to_string();
        if self.is_claimed(&first_letter) {
            None
        } else {
            Some(first_letter)
        }
    }

    fn next_numbered_code(&mut self) -> String {
        loop {
            let code = numbering_scheme(self.counter);
            self.counter += 1;
            if !self.is_claimed(&code) {
                return code;
            }
        }
    }
}

impl Default for KeyMinifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Bijective base-26 numeral of `counter` (1 → `a`, 26 → `z`, 27 → `aa`).
fn numbering_scheme(mut counter: u64) -> String {
    let mut letters = Vec::new();
    loop {
        counter -= 1;
        letters.push(b'a' + (counter % 26) as u8);
        counter /= 26;
        if counter == 0 {
            break;
        }
    }
    letters.iter().rev().map(|&letter| letter as char).collect()
}

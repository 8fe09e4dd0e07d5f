use std::collections::BTreeSet;

use regex::Regex;

/// Email, phone, postal address and region patterns.
pub struct ContactPatterns {
    email: Regex,
    phone: Regex,
    address: Regex,
    region: Regex,
}

impl ContactPatterns {
    pub fn compile() -> Result<Self, regex::Error> {
        Ok(ContactPatterns {
            email: Regex::new(r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+")?,
            phone: Regex::new(concat!(
                r"\+7\s?\(?\d{3}\)?[\s-]?\d{3}[\s-]?\d{2}[\s-]?\d{2}",
                r"|\b8\s?\(?\d{3}\)?[\s-]?\d{3}[\s-]?\d{2}[\s-]?\d{2}",
            ))?,
            address: Regex::new(
                r"(?:Адрес|Юридический адрес|Фактический адрес)[^\n:]{0,10}[:–-]\s?[^\n]{10,200}",
            )?,
            region: Regex::new(concat!(
                r"\bг\.\s?[А-ЯЁ][а-яё-]+",
                r"|\bСанкт[- ]?Петербург",
                r"|\b[А-ЯЁ][а-яё]+ская область",
            ))?,
        })
    }

    /// Every email address, deduplicated, sorted, `"; "`-joined.
    pub fn emails(&self, text: &str) -> String {
        join_sorted(self.email.find_iter(text).map(|m| m.as_str()))
    }

    /// Every phone number (`+7 …` or `8 …`), deduplicated, sorted, `"; "`-joined.
    pub fn phones(&self, text: &str) -> String {
        join_sorted(self.phone.find_iter(text).map(|m| m.as_str()))
    }

    /// First labelled address, label included.
    pub fn address(&self, text: &str) -> String {
        first_trimmed(&self.address, text)
    }

    pub fn region(&self, text: &str) -> String {
        first_trimmed(&self.region, text)
    }
}

fn first_trimmed(re: &Regex, text: &str) -> String {
    re.find(text)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn join_sorted<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>().join("; ")
}

// ── Tests ──

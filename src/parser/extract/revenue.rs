use regex::Regex;

/// Reporting year: a 19xx/20xx year followed by "г", "г." or "года".
pub struct RevenueYearPattern(Regex);

impl RevenueYearPattern {
    pub fn compile() -> Result<Self, regex::Error> {
        Ok(RevenueYearPattern(Regex::new(
            r"\b((?:19|20)\d{2})\b\s*г(?:\.|ода)?",
        )?))
    }

    pub fn find(&self, text: &str) -> String {
        self.0
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
}

// ── Tests ──

use regex::Regex;

/// Legal-form abbreviations a company name starts with.
pub const LEGAL_FORMS: &[&str] = &["ООО", "ОАО", "ЗАО", "ПАО", "ИП"];

const NAME_BODY: &str = r#"\s+["«]?[A-Za-zА-Яа-яЁё0-9\s.,-]+["»]?"#;
const LONG_FORM: &str = "Общество с ограниченной ответственностью";

/// Tax number (ИНН), state registration number (ОГРН) and legal name patterns.
pub struct IdentifierPatterns {
    inn: Regex,
    ogrn: Regex,
    company: Regex,
    company_long: Regex,
}

impl IdentifierPatterns {
    pub fn compile() -> Result<Self, regex::Error> {
        Ok(IdentifierPatterns {
            inn: Regex::new(r"\b\d{10}\b|\b\d{12}\b")?,
            ogrn: Regex::new(r"\b\d{13}\b")?,
            company: Regex::new(&format!(r"\b(?:{}){}", LEGAL_FORMS.join("|"), NAME_BODY))?,
            company_long: Regex::new(&format!("{}{}", LONG_FORM, NAME_BODY))?,
        })
    }

    /// First 10- or 12-digit token.
    pub fn inn<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.inn.find(text).map(|m| m.as_str())
    }

    /// First 13-digit token.
    pub fn ogrn<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.ogrn.find(text).map(|m| m.as_str())
    }

    /// First "legal form + name"; the spelled-out LLC form only when no abbreviation matches.
    pub fn company_name(&self, text: &str) -> Option<String> {
        self.company
            .find(text)
            .or_else(|| self.company_long.find(text))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

pub fn is_inn(token: &str) -> bool {
    matches!(token.len(), 10 | 12) && token.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_ogrn(token: &str) -> bool {
    token.len() == 13 && token.bytes().all(|b| b.is_ascii_digit())
}

pub fn starts_with_legal_form(text: &str) -> bool {
    LEGAL_FORMS.iter().any(|form| text.starts_with(form))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> IdentifierPatterns {
        IdentifierPatterns::compile().unwrap()
    }

    #[test]
    fn inn_is_ten_or_twelve_digits() {
        let p = patterns();
        assert_eq!(p.inn("ИНН 7701234567 КПП 770101001"), Some("7701234567"));
        assert_eq!(p.inn("ИНН: 500100732259"), Some("500100732259"));
        assert_eq!(p.inn("ОГРН 1027700132195"), None);
        assert_eq!(p.inn("тел 12345678901"), None);
    }

    #[test]
    fn ogrn_is_thirteen_digits() {
        let p = patterns();
        assert_eq!(p.ogrn("ИНН 7701234567 ОГРН 1027700132195"), Some("1027700132195"));
        assert_eq!(p.ogrn("ИНН 7701234567"), None);
    }

    #[test]
    fn quoted_company_name() {
        let p = patterns();
        assert_eq!(
            p.company_name(r#"Реквизиты: ООО "Ромашка" ИНН 1234567890"#).as_deref(),
            Some(r#"ООО "Ромашка""#)
        );
        assert_eq!(
            p.company_name("АО и ЗАО «Рекламные Решения» (Москва)").as_deref(),
            Some("ЗАО «Рекламные Решения»")
        );
    }

    #[test]
    fn bare_name_runs_to_first_foreign_character() {
        let p = patterns();
        assert_eq!(
            p.company_name("ИП Иванов И.И.; тел").as_deref(),
            Some("ИП Иванов И.И.")
        );
    }

    #[test]
    fn marker_inside_a_word_is_ignored() {
        let p = patterns();
        assert_eq!(p.company_name("ТИП Продукции"), None);
    }

    #[test]
    fn long_form_fallback() {
        let p = patterns();
        assert_eq!(
            p.company_name("Общество с ограниченной ответственностью «Вектор»; ИНН").as_deref(),
            Some("Общество с ограниченной ответственностью «Вектор»")
        );
    }

    #[test]
    fn token_predicates() {
        assert!(is_inn("1234567890"));
        assert!(is_inn("123456789012"));
        assert!(!is_inn("12345678901"));
        assert!(is_ogrn("1234567890123"));
        assert!(!is_ogrn("12345678901a3"));
        assert!(starts_with_legal_form("ООО Ромашка"));
        assert!(!starts_with_legal_form("Ромашка ООО"));
    }
}

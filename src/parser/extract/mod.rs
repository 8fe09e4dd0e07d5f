pub mod contacts;
pub mod identifiers;
pub mod ner;
#[cfg(feature = "ner")]
pub mod onnx;
pub mod revenue;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::ExtractSettings;
use crate::record::{DocKind, Evidence, Extraction};
use contacts::ContactPatterns;
use identifiers::IdentifierPatterns;
use ner::NerProvider;
use revenue::RevenueYearPattern;

/// Characters of a document handed to the recognizer.
const NER_MAX_CHARS: usize = 20_000;

/// A source of candidate field values for a text blob.
pub trait EvidenceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, kind: DocKind) -> bool {
        let _ = kind;
        true
    }

    fn extract(&self, text: &str) -> Evidence;
}

/// The regex battery: identifiers, legal name, contacts, address, region, revenue year.
pub struct RegexProvider {
    identifiers: IdentifierPatterns,
    contacts: ContactPatterns,
    revenue_year: RevenueYearPattern,
}

impl RegexProvider {
    pub fn compile() -> Result<Self> {
        Ok(RegexProvider {
            identifiers: IdentifierPatterns::compile()?,
            contacts: ContactPatterns::compile()?,
            revenue_year: RevenueYearPattern::compile()?,
        })
    }
}

impl EvidenceProvider for RegexProvider {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn extract(&self, text: &str) -> Evidence {
        Evidence {
            inn: self.identifiers.inn(text).unwrap_or_default().to_string(),
            ogrn: self.identifiers.ogrn(text).unwrap_or_default().to_string(),
            full_name: self.identifiers.company_name(text).unwrap_or_default(),
            region: self.contacts.region(text),
            address: self.contacts.address(text),
            contacts: self.contacts.phones(text),
            email: self.contacts.emails(text),
            revenue_year: self.revenue_year.find(text),
        }
    }
}

/// Providers in priority order; an earlier provider's value always beats a later one's.
pub struct ExtractorChain {
    providers: Vec<Box<dyn EvidenceProvider>>,
}

impl ExtractorChain {
    pub fn new(providers: Vec<Box<dyn EvidenceProvider>>) -> Self {
        ExtractorChain { providers }
    }

    /// Regex first, then the recognizer when a model is configured and loads.
    pub fn from_settings(settings: &ExtractSettings) -> Result<Self> {
        let mut providers: Vec<Box<dyn EvidenceProvider>> = vec![Box::new(RegexProvider::compile()?)];

        if let Some(dir) = &settings.ner_model_dir {
            match ner::load_recognizer(dir) {
                Ok(recognizer) => {
                    info!("NER evidence enabled ({:?})", dir);
                    providers.push(Box::new(NerProvider::new(
                        recognizer,
                        settings.ner_on_homepage,
                        NER_MAX_CHARS,
                    )));
                }
                Err(e) => warn!("NER disabled: {}", e),
            }
        }

        Ok(ExtractorChain::new(providers))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn evidence(&self, text: &str, kind: DocKind) -> Evidence {
        let mut evidence = Evidence::default();
        for provider in self.providers.iter().filter(|p| p.applies_to(kind)) {
            evidence.fill_from(&provider.extract(text));
        }
        evidence
    }

    pub fn homepage(&self, text: &str) -> Extraction {
        Extraction::homepage(self.evidence(text, DocKind::Homepage))
    }

    pub fn document(&self, text: &str, url: &str) -> Extraction {
        Extraction::pdf(self.evidence(text, DocKind::Pdf), url)
    }
}

// ── Tests ──

use anyhow::{Context, Result};
use tracing::{debug, info};
use url::Url;

use crate::config::Settings;
use crate::fetcher::Fetcher;
use crate::parser::extract::ExtractorChain;
use crate::parser::links::{document_links, extend_unique};
use crate::parser::text::{html_to_text, pdf_bytes_to_text};
use crate::record::AgencyRecord;
use crate::sitemap;

/// Drives one site through homepage → documents → merged record.
pub struct Enricher {
    fetcher: Fetcher,
    chain: ExtractorChain,
    document_suffix: String,
}

impl Enricher {
    pub fn new(fetcher: Fetcher, chain: ExtractorChain, document_suffix: &str) -> Self {
        Enricher {
            fetcher,
            chain,
            document_suffix: document_suffix.to_string(),
        }
    }

    /// Build the fetcher and extractor chain once; shared read-only by every row.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetcher = Fetcher::new(&settings.fetch)?;
        let chain = ExtractorChain::from_settings(&settings.extract)?;
        info!("Evidence providers: {}", chain.provider_names().join(", "));
        Ok(Enricher::new(fetcher, chain, &settings.extract.document_suffix))
    }

    /// Enrich one row. Fetch failures only leave fields empty; the error
    /// case is a `site` no root URL can be derived from.
    pub async fn enrich(&self, row: &AgencyRecord) -> Result<AgencyRecord> {
        let site = row.site.trim();
        let root = site_root(site)?;
        let mut record = row.trimmed();

        info!("Processing site: {}", site);

        // 1. Homepage
        let homepage = self.fetcher.fetch_page(root.as_str()).await;
        if let Some(page) = &homepage {
            let text = html_to_text(&page.body);
            if !text.is_empty() {
                record.merge(&self.chain.homepage(&text));
            }
        }

        // 2. Documents: DOM links first, then the sitemap
        let mut documents = match &homepage {
            Some(page) => document_links(&page.body, &root, &self.document_suffix),
            None => Vec::new(),
        };
        let listed = sitemap::fetch_document_urls(&self.fetcher, &root, &self.document_suffix).await;
        extend_unique(&mut documents, listed);
        if !documents.is_empty() {
            info!("Found {} documents on {}", documents.len(), root);
        }

        // 3. Each document in discovery order
        for url in &documents {
            let Some(bytes) = self.fetcher.fetch_document(url).await else {
                debug!("Document unavailable: {}", url);
                continue;
            };
            let extraction = self.chain.document(&pdf_bytes_to_text(&bytes), url);
            if extraction.evidence.is_empty() {
                debug!("No fields in {}", url);
            }
            record.merge(&extraction);
        }

        // 4. Listing metadata passes through untouched
        record.name = row.name.clone();
        record.site = site.to_string();
        record.segment_tag = row.segment_tag.clone();
        record.source = row.source.clone();
        record.revenue = row.revenue.clone();

        Ok(record)
    }
}

/// `scheme://host[:port]/` of a site URL; bare hosts are taken as `http://`.
pub fn site_root(site: &str) -> Result<Url> {
    let candidate = if site.contains("://") {
        site.to_string()
    } else {
        format!("http://{}", site)
    };
    let parsed =
        Url::parse(&candidate).with_context(|| format!("Invalid site URL {:?}", site))?;
    let origin = parsed.origin();
    anyhow::ensure!(origin.is_tuple(), "Site URL {:?} has no host", site);
    Url::parse(&format!("{}/", origin.ascii_serialization()))
        .with_context(|| format!("Invalid site URL {:?}", site))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractSettings;
    use crate::fetcher::fast_settings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn enricher() -> Enricher {
        let fetcher = Fetcher::new(&fast_settings(&["test-agent"])).unwrap();
        let chain = ExtractorChain::from_settings(&ExtractSettings::default()).unwrap();
        Enricher::new(fetcher, chain, ".pdf")
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(format!("<html><body>{}</body></html>", body))
    }

    async fn mount_get(server: &MockServer, at: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[test]
    fn root_of_site_urls() {
        assert_eq!(
            site_root("https://agency.ru/about?x=1#top").unwrap().as_str(),
            "https://agency.ru/"
        );
        assert_eq!(site_root("agency.ru").unwrap().as_str(), "http://agency.ru/");
        assert_eq!(
            site_root("http://127.0.0.1:8080/x").unwrap().as_str(),
            "http://127.0.0.1:8080/"
        );
        assert!(site_root("").is_err());
        assert!(site_root("http://").is_err());
    }

    #[tokio::test]
    async fn homepage_identifiers_without_documents() {
        let server = MockServer::start().await;
        mount_get(&server, "/", html(r#"<h1>ООО "Ромашка"</h1><p>ИНН 1234567890</p>"#)).await;
        mount_get(&server, "/sitemap.xml", ResponseTemplate::new(404)).await;

        let row = AgencyRecord {
            name: "Ромашка".into(),
            site: format!("{}/catalog", server.uri()),
            segment_tag: "BTL".into(),
            source: "marketingtech".into(),
            revenue: "250000000".into(),
            ..Default::default()
        };
        let out = enricher().enrich(&row).await.unwrap();

        assert_eq!(out.inn, "1234567890");
        assert_eq!(out.full_name, r#"ООО "Ромашка""#);
        assert_eq!(out.doc_type, "homepage");
        assert_eq!(out.doc_url, "");
        assert_eq!(out.name, "Ромашка");
        assert_eq!(out.site, row.site);
        assert_eq!(out.segment_tag, "BTL");
        assert_eq!(out.revenue, "250000000");
    }

    #[tokio::test]
    async fn document_evidence_takes_over_provenance() {
        let server = MockServer::start().await;
        let pdf_url = format!("{}/docs/rekvizity.pdf", server.uri());
        mount_get(
            &server,
            "/",
            html(r#"<p>sales@agency.ru</p><a href="/docs/rekvizity.pdf">Реквизиты</a>"#),
        )
        .await;
        mount_get(
            &server,
            "/sitemap.xml",
            ResponseTemplate::new(200).set_body_string(format!(
                "<urlset><url><loc>{}</loc></url><url><loc>{}/docs/missing.pdf</loc></url></urlset>",
                pdf_url,
                server.uri()
            )),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/docs/rekvizity.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"%PDF-1.4 BT (INN 7701234567 OGRN 1027700132195) Tj ET".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_get(&server, "/docs/missing.pdf", ResponseTemplate::new(404)).await;

        let row = AgencyRecord {
            site: server.uri(),
            ..Default::default()
        };
        let out = enricher().enrich(&row).await.unwrap();

        assert_eq!(out.email, "sales@agency.ru");
        assert_eq!(out.inn, "7701234567");
        assert_eq!(out.ogrn, "1027700132195");
        assert_eq!(out.doc_url, pdf_url);
        assert_eq!(out.doc_type, "pdf");
    }

    #[tokio::test]
    async fn existing_values_survive_enrichment() {
        let server = MockServer::start().await;
        mount_get(&server, "/", html("ИНН 1111111111 г. Казань")).await;
        mount_get(&server, "/sitemap.xml", ResponseTemplate::new(404)).await;

        let row = AgencyRecord {
            inn: "1234567890".into(),
            site: server.uri(),
            ..Default::default()
        };
        let out = enricher().enrich(&row).await.unwrap();
        assert_eq!(out.inn, "1234567890");
        assert_eq!(out.region, "г. Казань");
    }

    #[tokio::test]
    async fn unreachable_site_leaves_record_unchanged() {
        let row = AgencyRecord {
            name: "Ромашка".into(),
            site: "http://127.0.0.1:9/".into(),
            email: "a@b.ru".into(),
            ..Default::default()
        };
        let out = enricher().enrich(&row).await.unwrap();
        assert_eq!(out, row);
    }
}

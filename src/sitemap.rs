//! Sitemap discovery, parsing, and whole-site preload.
//!
//! A sitemap document is either an index (`<sitemap><loc>` children pointing
//! at further sitemaps) or a leaf set of `<url><loc>` entries. Discovery
//! probes a fixed list of well-known paths with HEAD requests and accepts
//! the first that answers 200.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::config::SweepConfig;
use crate::error::{Result, SweepError};
use crate::fanout::FanoutRequest;
use crate::http::HttpClient;
use crate::preload::PreloadThrottler;
use crate::queue::TaskQueue;
use crate::urls::UrlSet;

/// Timeout for fetching a sitemap document.
const SITEMAP_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for a discovery HEAD probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum index nesting; indexes pointing at indexes deeper than this are
/// treated as malformed.
const MAX_SITEMAP_DEPTH: usize = 5;

/// Slice size when feeding a sitemap's URL set through the preload path.
const SITEMAP_PRELOAD_SLICE: usize = 30;

/// Well-known sitemap locations, in probe order. Covers the default and the
/// common SEO-plugin layouts.
pub const WELL_KNOWN_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap/sitemap.xml",
    "/sitemaps/sitemap.xml",
    "/sitemap.php",
    "/sitemap.txt",
    "/wp-sitemap.xml",
    "/sitemap.xml.gz",
    "/sitemap-main.xml",
    "/sitemap_index.xml.gz",
    "/sitemap-index.xml",
    "/sitemap-news.xml",
    "/sitemap-video.xml",
    "/sitemap-image.xml",
];

/// A parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// Index document; entries are URLs of child sitemaps.
    Index(Vec<String>),
    /// Leaf document; entries are page URLs.
    Urls(Vec<String>),
}

/// Parse a sitemap XML document.
///
/// # Errors
/// `SitemapParse` when the XML is malformed or the document contains no
/// `<loc>` entries at all.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    #[derive(Clone, Copy, PartialEq)]
    enum Container {
        Sitemap,
        Url,
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut container: Option<Container> = None;
    let mut in_loc = false;
    let mut index_locs = Vec::new();
    let mut url_locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"sitemap" => container = Some(Container::Sitemap),
                b"url" => container = Some(Container::Url),
                b"loc" if container.is_some() => in_loc = true,
                _ => {}
            },
            Ok(Event::Text(text)) if in_loc => {
                let loc = text
                    .unescape()
                    .map_err(|e| SweepError::SitemapParse(e.to_string()))?
                    .trim()
                    .to_string();
                if !loc.is_empty() {
                    match container {
                        Some(Container::Sitemap) => index_locs.push(loc),
                        Some(Container::Url) => url_locs.push(loc),
                        None => {}
                    }
                }
            }
            Ok(Event::End(end)) => match end.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"sitemap" | b"url" => container = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => {
                return Err(SweepError::SitemapParse(format!(
                    "malformed sitemap XML at byte {}: {error}",
                    reader.buffer_position()
                )));
            }
        }
    }

    if !index_locs.is_empty() {
        Ok(SitemapDocument::Index(index_locs))
    } else if !url_locs.is_empty() {
        Ok(SitemapDocument::Urls(url_locs))
    } else {
        Err(SweepError::SitemapParse(
            "sitemap contains no URLs".to_string(),
        ))
    }
}

/// Fetch a sitemap and collect every page URL it (transitively) lists.
///
/// Index children that fail to fetch or parse are logged and skipped; the
/// pass only aborts when the root document itself is unusable.
pub fn extract_urls<H>(
    client: &H,
    sitemap_url: String,
    depth: usize,
) -> BoxFuture<'_, Result<Vec<String>>>
where
    H: HttpClient + 'static,
{
    Box::pin(async move {
        if depth == 0 {
            return Err(SweepError::SitemapParse(
                "sitemap index nesting too deep".to_string(),
            ));
        }

        let request = FanoutRequest::get(&sitemap_url, SITEMAP_FETCH_TIMEOUT);
        let response = client.execute(&request).await?;
        if !response.is_success() {
            return Err(SweepError::RemoteApi {
                status: response.status,
                message: format!("sitemap fetch failed for {sitemap_url}"),
            });
        }

        match parse_sitemap(&response.body)? {
            SitemapDocument::Urls(urls) => Ok(urls),
            SitemapDocument::Index(children) => {
                let mut urls = Vec::new();
                for child in children {
                    match extract_urls(client, child.clone(), depth - 1).await {
                        Ok(mut child_urls) => urls.append(&mut child_urls),
                        Err(error) => {
                            tracing::warn!(sitemap = %child, error = %error, "Skipping unusable child sitemap");
                        }
                    }
                }
                Ok(urls)
            }
        }
    })
}

/// Probe well-known sitemap paths under `origin_base`, then look for a
/// `<link rel="sitemap">` on the homepage, falling back to
/// `{origin_base}/sitemap.xml`.
pub async fn discover_sitemap<H: HttpClient>(client: &H, origin_base: &str) -> String {
    let base = origin_base.trim_end_matches('/');
    for path in WELL_KNOWN_SITEMAP_PATHS {
        let candidate = format!("{base}{path}");
        let request = FanoutRequest::head(&candidate, PROBE_TIMEOUT);
        match client.execute(&request).await {
            Ok(response) if response.status == 200 => {
                tracing::debug!(sitemap = %candidate, "Discovered sitemap");
                return candidate;
            }
            _ => {}
        }
    }

    // Second stage: the homepage may advertise its sitemap itself.
    let request = FanoutRequest::get(base, PROBE_TIMEOUT);
    if let Ok(response) = client.execute(&request).await {
        if response.is_success() {
            if let Some(href) = sitemap_link_from_html(&response.body) {
                let absolute = if href.starts_with("http://") || href.starts_with("https://") {
                    href
                } else {
                    format!("{base}/{}", href.trim_start_matches('/'))
                };
                tracing::debug!(sitemap = %absolute, "Discovered sitemap from homepage link");
                return absolute;
            }
        }
    }

    format!("{base}/sitemap.xml")
}

/// `href` of the first `<link rel="sitemap" ...>` tag, if any. A targeted
/// string scan is enough here; homepage markup is not otherwise parsed.
fn sitemap_link_from_html(html: &str) -> Option<String> {
    for (start, _) in html.match_indices("<link") {
        let rest = &html[start..];
        let Some(end) = rest.find('>') else { continue };
        let tag = &rest[..end];
        let lower = tag.to_ascii_lowercase();
        if !lower.contains(r#"rel="sitemap""#) && !lower.contains("rel='sitemap'") {
            continue;
        }
        if let Some(href) = tag_attribute(tag, "href") {
            return Some(href);
        }
    }
    None
}

/// Quoted attribute value from a single tag's text.
fn tag_attribute(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let pos = lower.find(&format!("{name}="))?;
    let rest = &tag[pos + name.len() + 1..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// Warms the whole site from its sitemap, feeding the URL set through the
/// load-throttled preload path in fixed-size slices.
pub struct SitemapPreloader<H, Q>
where
    H: HttpClient,
    Q: TaskQueue,
{
    throttler: Arc<PreloadThrottler<H, Q>>,
    config: Arc<SweepConfig>,
}

impl<H, Q> SitemapPreloader<H, Q>
where
    H: HttpClient + 'static,
    Q: TaskQueue,
{
    pub fn new(throttler: Arc<PreloadThrottler<H, Q>>, config: Arc<SweepConfig>) -> Self {
        Self { throttler, config }
    }

    /// Resolve the sitemap, extract its URLs, and preload them all.
    ///
    /// # Errors
    /// `SitemapParse` when no sitemap URL can be resolved or the sitemap
    /// yields no URLs; fetch and parse failures of the root document also
    /// abort the pass.
    #[tracing::instrument(skip(self))]
    pub async fn preload_from_sitemap(&self) -> Result<()> {
        let client = self.throttler.http().clone();

        let sitemap_url = match &self.config.sitemap_url {
            Some(url) => url.clone(),
            None => {
                let base = self.config.origin_base.as_deref().ok_or_else(|| {
                    SweepError::SitemapParse(
                        "no sitemap URL or origin base configured".to_string(),
                    )
                })?;
                discover_sitemap(&client, base).await
            }
        };

        let urls = extract_urls(&client, sitemap_url.clone(), MAX_SITEMAP_DEPTH).await?;
        let set = UrlSet::new(&urls);
        if set.is_empty() {
            return Err(SweepError::SitemapParse(format!(
                "no URLs found in {sitemap_url}"
            )));
        }

        self.throttler
            .journal()
            .record(&format!("found {} urls to preload from sitemap", set.len()));

        for slice in set.chunks(SITEMAP_PRELOAD_SLICE) {
            self.throttler.preload(&UrlSet::new(slice)).await;
        }

        self.throttler.journal().record("finished sitemap preload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leaf_url_set() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <url><loc>https://example.com/</loc><lastmod>2024-01-01</lastmod></url>
                <url><loc>https://example.com/about/</loc></url>
            </urlset>"#;
        assert_eq!(
            parse_sitemap(xml).unwrap(),
            SitemapDocument::Urls(vec![
                "https://example.com/".to_string(),
                "https://example.com/about/".to_string(),
            ])
        );
    }

    #[test]
    fn parses_index_document() {
        let xml = r#"<sitemapindex>
                <sitemap><loc>https://example.com/post-sitemap.xml</loc></sitemap>
                <sitemap><loc>https://example.com/page-sitemap.xml</loc></sitemap>
            </sitemapindex>"#;
        assert_eq!(
            parse_sitemap(xml).unwrap(),
            SitemapDocument::Index(vec![
                "https://example.com/post-sitemap.xml".to_string(),
                "https://example.com/page-sitemap.xml".to_string(),
            ])
        );
    }

    #[test]
    fn rejects_malformed_and_empty_documents() {
        assert!(matches!(
            parse_sitemap("<urlset><url></urlset>"),
            Err(SweepError::SitemapParse(_))
        ));
        assert!(matches!(
            parse_sitemap("<urlset></urlset>"),
            Err(SweepError::SitemapParse(_))
        ));
        assert!(matches!(
            parse_sitemap(""),
            Err(SweepError::SitemapParse(_))
        ));
    }

    #[test]
    fn loc_outside_containers_is_ignored() {
        let xml = "<root><loc>https://example.com/stray</loc></root>";
        assert!(parse_sitemap(xml).is_err());
    }

    #[tokio::test]
    async fn discovery_accepts_first_200_probe() {
        use crate::http::MockHttpClient;

        let mock = MockHttpClient::new();
        mock.add_status("HEAD", "https://example.com/sitemap.xml", 404);
        mock.add_status("HEAD", "https://example.com/sitemap_index.xml", 200);

        let found = discover_sitemap(&mock, "https://example.com/").await;
        assert_eq!(found, "https://example.com/sitemap_index.xml");
        // Probing stops at the first hit.
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn discovery_falls_back_to_default_path() {
        use crate::http::MockHttpClient;

        // Nothing configured: every HEAD probe and the homepage fetch error,
        // so the default wins.
        let mock = MockHttpClient::new();
        let found = discover_sitemap(&mock, "https://example.com").await;
        assert_eq!(found, "https://example.com/sitemap.xml");
        assert_eq!(mock.call_count(), WELL_KNOWN_SITEMAP_PATHS.len() + 1);
    }

    #[tokio::test]
    async fn discovery_reads_homepage_sitemap_link() {
        use crate::http::{HttpResponse, MockHttpClient};

        // All well-known probes miss; the homepage advertises the sitemap.
        let mock = MockHttpClient::new();
        mock.add_response(
            "GET",
            "https://example.com",
            Ok(HttpResponse {
                status: 200,
                body: r#"<html><head>
                    <link rel="stylesheet" href="/style.css">
                    <link rel="sitemap" type="application/xml" href="/custom-map.xml">
                </head></html>"#
                    .to_string(),
            }),
        );

        let found = discover_sitemap(&mock, "https://example.com").await;
        assert_eq!(found, "https://example.com/custom-map.xml");
    }

    #[test]
    fn homepage_link_scan_handles_absolute_and_missing_hrefs() {
        assert_eq!(
            sitemap_link_from_html(
                r#"<link rel='sitemap' href='https://cdn.example.com/map.xml'>"#
            ),
            Some("https://cdn.example.com/map.xml".to_string())
        );
        assert_eq!(sitemap_link_from_html(r#"<link rel="sitemap">"#), None);
        assert_eq!(
            sitemap_link_from_html("<html><link rel=\"icon\" href=\"/i.png\"></html>"),
            None
        );
        assert_eq!(sitemap_link_from_html("no links here"), None);
    }

    #[tokio::test]
    async fn extract_recurses_through_index() {
        use crate::http::{HttpResponse, MockHttpClient};

        let mock = MockHttpClient::new();
        mock.add_response(
            "GET",
            "https://example.com/sitemap.xml",
            Ok(HttpResponse {
                status: 200,
                body: r#"<sitemapindex>
                    <sitemap><loc>https://example.com/a.xml</loc></sitemap>
                    <sitemap><loc>https://example.com/b.xml</loc></sitemap>
                </sitemapindex>"#
                    .to_string(),
            }),
        );
        mock.add_response(
            "GET",
            "https://example.com/a.xml",
            Ok(HttpResponse {
                status: 200,
                body: "<urlset><url><loc>https://example.com/1</loc></url></urlset>".to_string(),
            }),
        );
        // b.xml unconfigured: fetch fails, child is skipped.

        let urls = extract_urls(&mock, "https://example.com/sitemap.xml".to_string(), 5)
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://example.com/1".to_string()]);
    }

    #[tokio::test]
    async fn extract_fails_on_unusable_root() {
        use crate::http::{HttpResponse, MockHttpClient};

        let mock = MockHttpClient::new();
        mock.add_response(
            "GET",
            "https://example.com/sitemap.xml",
            Ok(HttpResponse {
                status: 500,
                body: String::new(),
            }),
        );

        let result = extract_urls(&mock, "https://example.com/sitemap.xml".to_string(), 5).await;
        assert!(matches!(result, Err(SweepError::RemoteApi { status: 500, .. })));
    }
}

//! Dataset loading.
//!
//! Fetches the GeoJSON feature collection and the detail document, from
//! local files or http(s) URLs. Both fetches run concurrently and the load
//! only succeeds when both do; the first failure is the one reported.

use crate::models::{Dataset, DetailDataset, MetroFeature};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can end a load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse {what} from {origin}: {source}")]
    Parse {
        what: &'static str,
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{origin} is not a valid {what}: {reason}")]
    Shape {
        what: &'static str,
        origin: String,
        reason: String,
    },
}

/// Where a document is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Url(String),
}

impl Source {
    /// Interpret a config/CLI value: http(s) URLs are fetched, anything else is a path.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            Source::Url(value.to_string())
        } else {
            Source::Path(PathBuf::from(value))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Options for loading the dataset.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Timeout for remote fetches.
    pub timeout: Duration,
    /// Whether to show a spinner while loading.
    pub show_progress: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            show_progress: true,
        }
    }
}

/// Fetches and parses the two dashboard documents.
pub struct Loader {
    http_client: reqwest::Client,
    options: LoadOptions,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Result<Self, LoadError> {
        let http_client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(LoadError::Client)?;

        Ok(Self {
            http_client,
            options,
        })
    }

    /// Load both documents; fails as a whole if either one fails.
    pub async fn load(&self, geojson: &Source, detail: &Source) -> Result<Dataset, LoadError> {
        info!("Loading dataset from {} and {}", geojson, detail);

        let spinner = if self.options.show_progress {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.set_message("Loading metro data...");
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        } else {
            None
        };

        let fetched = futures::try_join!(self.fetch(geojson), self.fetch(detail));

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        let (geojson_bytes, detail_bytes) = fetched?;
        debug!(
            "Fetched {} bytes of GeoJSON and {} bytes of detail data",
            geojson_bytes.len(),
            detail_bytes.len()
        );

        let features = parse_features(&geojson_bytes, &geojson.to_string())?;
        let detail = parse_detail(&detail_bytes, &detail.to_string())?;

        info!(
            "Loaded {} metro features and detail rows for {} metros",
            features.len(),
            detail.len()
        );

        Ok(Dataset { features, detail })
    }

    /// Read one document into memory.
    async fn fetch(&self, source: &Source) -> Result<Vec<u8>, LoadError> {
        match source {
            Source::Path(path) => tokio::fs::read(path).await.map_err(|source| LoadError::Read {
                path: path.display().to_string(),
                source,
            }),
            Source::Url(url) => {
                let fetch_error = |source| LoadError::Fetch {
                    url: url.clone(),
                    source,
                };

                let response = self
                    .http_client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(fetch_error)?;

                let bytes = response.bytes().await.map_err(fetch_error)?;
                Ok(bytes.to_vec())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Value>,
}

/// Parse metro features out of a GeoJSON feature collection.
///
/// Features without usable properties (no GEOID) are skipped with a warning.
pub fn parse_features(bytes: &[u8], origin: &str) -> Result<Vec<MetroFeature>, LoadError> {
    let collection: FeatureCollection =
        serde_json::from_slice(bytes).map_err(|source| LoadError::Parse {
            what: "GeoJSON",
            origin: origin.to_string(),
            source,
        })?;

    if collection.kind != "FeatureCollection" {
        return Err(LoadError::Shape {
            what: "GeoJSON FeatureCollection",
            origin: origin.to_string(),
            reason: format!("type is '{}'", collection.kind),
        });
    }

    let mut features = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let Some(properties) = feature.properties else {
            warn!("Skipping feature {} in {}: no properties", i, origin);
            continue;
        };

        match serde_json::from_value::<MetroFeature>(properties) {
            Ok(metro) => features.push(metro),
            Err(e) => warn!("Skipping feature {} in {}: {}", i, origin, e),
        }
    }

    Ok(features)
}

/// Parse the detail document (GEOID -> breakdown rows).
pub fn parse_detail(bytes: &[u8], origin: &str) -> Result<DetailDataset, LoadError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| LoadError::Parse {
        what: "detail data",
        origin: origin.to_string(),
        source,
    })?;

    if !value.is_object() {
        return Err(LoadError::Shape {
            what: "detail document",
            origin: origin.to_string(),
            reason: "expected an object keyed by GEOID".to_string(),
        });
    }

    serde_json::from_value(value).map_err(|source| LoadError::Parse {
        what: "detail rows",
        origin: origin.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Year;
    use std::path::Path;

    const GEOJSON: &str = include_str!("../../fixtures/metro_areas_oy.geojson");
    const DETAIL: &str = include_str!("../../fixtures/metro_detailed_data.json");

    fn quiet_loader() -> Loader {
        Loader::new(LoadOptions {
            show_progress: false,
            ..LoadOptions::default()
        })
        .unwrap()
    }

    fn write_fixtures(dir: &Path) -> (Source, Source) {
        let geojson = dir.join("metro_areas_oy.geojson");
        let detail = dir.join("metro_detailed_data.json");
        std::fs::write(&geojson, GEOJSON).unwrap();
        std::fs::write(&detail, DETAIL).unwrap();
        (Source::Path(geojson), Source::Path(detail))
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            Source::parse("https://example.org/d.json"),
            Source::Url("https://example.org/d.json".to_string())
        );
        assert_eq!(
            Source::parse("data/d.json"),
            Source::Path(PathBuf::from("data/d.json"))
        );
    }

    #[test]
    fn test_parse_fixture_features() {
        let features = parse_features(GEOJSON.as_bytes(), "fixture").unwrap();
        assert_eq!(features.len(), 3);

        let houston = features.iter().find(|f| f.geoid == "26420").unwrap();
        assert_eq!(houston.name, "Houston-The Woodlands-Sugar Land, TX");
        assert_eq!(houston.total_opportunity_youth[Year::Y2023], 104_500);
    }

    #[test]
    fn test_parse_features_skips_bad_entries() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"NAME": "No id"}},
            {"type": "Feature", "properties": null},
            {"type": "Feature", "properties": {"GEOID": "1", "NAME": "Ok"}}
        ]}"#;

        let features = parse_features(json.as_bytes(), "inline").unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].geoid, "1");
    }

    #[test]
    fn test_parse_features_rejects_non_collection() {
        let err = parse_features(br#"{"type": "Feature"}"#, "inline").unwrap_err();
        assert!(matches!(err, LoadError::Shape { .. }));
    }

    #[test]
    fn test_parse_detail() {
        let detail = parse_detail(DETAIL.as_bytes(), "fixture").unwrap();
        assert_eq!(detail.len(), 3);
        assert_eq!(detail["26420"].len(), 4);

        assert!(matches!(
            parse_detail(b"[1, 2]", "inline"),
            Err(LoadError::Shape { .. })
        ));
        assert!(matches!(
            parse_detail(b"{not json", "inline"),
            Err(LoadError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let (geojson, detail) = write_fixtures(dir.path());

        let dataset = quiet_loader().load(&geojson, &detail).await.unwrap();
        assert_eq!(dataset.features.len(), 3);
        assert_eq!(dataset.detail.len(), 3);
    }

    #[test]
    fn test_missing_document_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let (geojson, _) = write_fixtures(dir.path());
        let missing = Source::Path(dir.path().join("nope.json"));

        let result = tokio_test::block_on(quiet_loader().load(&geojson, &missing));
        match result {
            Err(LoadError::Read { path, .. }) => assert!(path.ends_with("nope.json")),
            other => panic!("expected read error, got {:?}", other.map(|d| d.features.len())),
        }
    }
}

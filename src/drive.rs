use crate::utils::RetryPolicy;
use anyhow::Context;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::path::Path;
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const DOWNLOAD_URL: &str = "https://drive.google.com/uc";
const CONFIRM_URL: &str = "https://drive.usercontent.google.com/download";

static CONFIRM_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="confirm"\s+value="([^"]+)""#).unwrap());
static CONFIRM_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confirm=([0-9A-Za-z_-]+)").unwrap());
static UUID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="uuid"\s+value="([^"]+)""#).unwrap());

/// Hidden form fields from the "can't scan this file for viruses" page.
#[derive(Debug, PartialEq, Eq)]
struct Confirmation {
    token: String,
    uuid: Option<String>,
}

fn parse_confirmation(html: &str) -> Option<Confirmation> {
    let token = CONFIRM_INPUT_RE
        .captures(html)
        .or_else(|| CONFIRM_PARAM_RE.captures(html))?
        .get(1)?
        .as_str()
        .to_string();
    let uuid = UUID_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some(Confirmation { token, uuid })
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// Downloads shared-drive files by id.
pub struct DriveFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl DriveFetcher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry,
        }
    }

    pub async fn fetch(&self, id: &str, dest: &Path) -> anyhow::Result<()> {
        info!("Downloading narration {} to {}", id, dest.display());
        self.retry
            .run(&format!("downloading drive file {}", id), || self.download(id, dest))
            .await
            .with_context(|| format!("Failed to download drive file {}", id))
    }

    async fn download(&self, id: &str, dest: &Path) -> anyhow::Result<()> {
        let response = self
            .client
            .get(DOWNLOAD_URL)
            .header(USER_AGENT, "episode-stitcher/0.1")
            .query(&[("export", "download"), ("id", id)])
            .send()
            .await?
            .error_for_status()?;

        let response = if is_html(&response) {
            let page = response.text().await?;
            let confirm = parse_confirmation(&page).with_context(|| {
                format!("Drive returned a page instead of file {} (private or missing?)", id)
            })?;
            debug!("Drive asked for confirmation of {}, retrying with token", id);
            let mut query = vec![
                ("id", id.to_string()),
                ("export", "download".to_string()),
                ("confirm", confirm.token),
            ];
            if let Some(uuid) = confirm.uuid {
                query.push(("uuid", uuid));
            }
            let confirmed = self
                .client
                .get(CONFIRM_URL)
                .header(USER_AGENT, "episode-stitcher/0.1")
                .query(&query)
                .send()
                .await?
                .error_for_status()?;
            if is_html(&confirmed) {
                anyhow::bail!("Drive refused to serve file {} after confirmation", id);
            }
            confirmed
        } else {
            response
        };

        write_body(response, dest).await
    }
}

/// Streams the body next to `dest` and renames it into place when complete.
async fn write_body(mut response: reqwest::Response, dest: &Path) -> anyhow::Result<()> {
    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;
    debug!("Wrote {} bytes to {}", written, dest.display());
    Ok(())
}

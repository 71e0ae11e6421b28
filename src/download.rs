use crate::error::{GovmError, IoContext, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub struct Downloader {
    client: Client,
    show_progress: bool,
}

impl Downloader {
    /// Downloads carry no timeout; they run until the transfer completes.
    pub fn new(show_progress: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| GovmError::Network {
                url: String::new(),
                source: e,
            })?;

        Ok(Self {
            client,
            show_progress,
        })
    }

    fn progress_bar(&self, total_size: u64, url: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!(
            "Downloading {}",
            url.rsplit('/').next().unwrap_or("file")
        ));
        pb
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// An empty body is a failure even when the transfer itself succeeded.
    pub async fn download_with_progress<P: AsRef<Path>>(&self, url: &str, dest: P) -> Result<u64> {
        let dest = dest.as_ref();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GovmError::Network {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GovmError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        let pb = self.progress_bar(total_size, url);

        let mut file = File::create(dest).await.at(dest)?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GovmError::Network {
                url: url.to_string(),
                source: e,
            })?;
            file.write_all(&chunk).await.at(dest)?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await.at(dest)?;

        if downloaded == 0 {
            pb.abandon_with_message("Downloaded empty file");
            return Err(GovmError::EmptyDownload(url.to_string()));
        }

        pb.finish_with_message("Download complete");
        Ok(downloaded)
    }

    /// Verify file checksum
    pub async fn verify_checksum<P: AsRef<Path>>(path: P, expected_checksum: &str) -> Result<bool> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::open(path).await.at(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0; 8192];

        use tokio::io::AsyncReadExt;
        loop {
            let bytes_read = file.read(&mut buffer).await.at(path)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        let computed = format!("{:x}", hasher.finalize());
        Ok(computed.eq_ignore_ascii_case(expected_checksum))
    }
}

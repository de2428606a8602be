use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{HisdbError, fs_error};

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

/// Retrieves a remote resource into a local file.
pub trait Fetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), HisdbError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, HisdbError> {
        // The archives are several GB; only the connect phase is bounded.
        let client = Client::builder()
            .user_agent(format!("diva-hisdb/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(60))
            .timeout(None)
            .build()
            .map_err(|err| HisdbError::Transfer {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }

    fn write_response_to_file(
        &self,
        url: &str,
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<(), HisdbError> {
        if !response.status().is_success() {
            return Err(HisdbError::TransferStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|err| fs_error(parent, err))?;
        }
        let file = File::create(destination).map_err(|err| fs_error(destination, err))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        let bytes = std::io::copy(&mut response, &mut writer).map_err(|err| HisdbError::Transfer {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        writer
            .into_inner()
            .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
        tracing::debug!(url, bytes, "download finished");
        Ok(())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), HisdbError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| HisdbError::Transfer {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        self.write_response_to_file(url, response, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_without_network() {
        assert!(HttpFetcher::new().is_ok());
    }
}

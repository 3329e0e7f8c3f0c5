use anyhow::{Result, bail};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const MAX_NAME_LEN: usize = 100;

/// Object storage for listing images.
///
/// Each blob is a flat file at `{dir}/{key}`, where the key is
/// `{unix millis}_{sanitized filename}`. Blobs are served back under
/// `{public_base_url}/images/{key}`.
pub struct Storage {
    dir: PathBuf,
    public_base_url: String,
}

impl Storage {
    pub async fn new(dir: PathBuf, public_base_url: &str) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Retrievable URL for a stored blob.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/images/{}", self.public_base_url, key)
    }

    /// Store a blob under a fresh key derived from the upload time and the
    /// client's filename. Returns the key.
    pub async fn put(&self, filename: &str, data: &[u8]) -> Result<String> {
        let base = format!("{}_{}", chrono::Utc::now().timestamp_millis(), sanitize_filename(filename));

        let mut attempt = 0u32;
        loop {
            let key = if attempt == 0 {
                base.clone()
            } else {
                with_suffix(&base, attempt)
            };

            // create_new refuses to clobber a blob uploaded in the same millisecond
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&key))
                .await
            {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    info!("Stored blob {} ({} bytes)", key, data.len());
                    return Ok(key);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 100 => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        Ok(fs::read(self.dir.join(key)).await?)
    }

    /// Delete a blob. Missing blobs are not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match fs::remove_file(self.dir.join(key)).await {
            Ok(()) => {
                info!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Keys are single path components produced by `put`.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
        bail!("Invalid blob key: {:?}", key);
    }
    Ok(())
}

/// Reduce a client-supplied filename to `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers may send a full path
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned.chars().take(MAX_NAME_LEN).collect();

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

fn with_suffix(base: &str, n: u32) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{n}.{ext}"),
        None => format!("{base}-{n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("localist_storage_{}_{}", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn sanitizes_filenames() {
        assert_eq!(sanitize_filename("shop front.JPG"), "shop_front.JPG");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\café.png"), "caf_.png");
        assert_eq!(sanitize_filename("..."), "image");
        assert_eq!(sanitize_filename(""), "image");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), MAX_NAME_LEN);
    }

    #[test]
    fn rejects_traversal_keys() {
        assert!(validate_key("123_a.png").is_ok());
        assert!(validate_key("../secret").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("").is_err());
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(with_suffix("1_a.png", 2), "1_a-2.png");
        assert_eq!(with_suffix("1_image", 1), "1_image-1");
    }

    #[tokio::test]
    async fn put_read_delete() {
        let dir = temp_dir("roundtrip");
        let storage = Storage::new(dir.clone(), "http://localhost:3000/").await.unwrap();

        let a = storage.put("front.png", b"one").await.unwrap();
        let b = storage.put("front.png", b"two").await.unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with("_front.png"));

        assert_eq!(storage.read(&b).await.unwrap(), b"two");
        assert_eq!(storage.public_url(&a), format!("http://localhost:3000/images/{a}"));

        storage.delete(&a).await.unwrap();
        storage.delete(&a).await.unwrap();
        assert!(storage.read(&a).await.is_err());

        let _ = std::fs::remove_dir_all(dir);
    }
}

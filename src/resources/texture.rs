use std::sync::Arc;

use crate::{
    data_structures::texture::{TextureData, cube_to_equirect},
    error::{AssetError, AssetResult},
    resources::{AssetLoader, Pending, extension},
};

#[cfg(target_arch = "wasm32")]
fn format_url(root: &str, file_name: &str) -> AssetResult<reqwest::Url> {
    let fetch_error = |message: String| AssetError::Fetch {
        source_name: file_name.to_string(),
        message,
    };
    let origin = web_sys::window()
        .ok_or_else(|| fetch_error("no window".to_string()))?
        .location()
        .origin()
        .map_err(|_| fetch_error("the page has no origin".to_string()))?;
    let base = reqwest::Url::parse(&format!("{}/{}/", origin, root.trim_matches('/')))
        .map_err(|e| fetch_error(e.to_string()))?;
    base.join(file_name).map_err(|e| fetch_error(e.to_string()))
}

#[cfg(target_arch = "wasm32")]
async fn fetch(url: reqwest::Url) -> Result<Vec<u8>, reqwest::Error> {
    Ok(reqwest::get(url)
        .await?
        .error_for_status()?
        .bytes()
        .await?
        .to_vec())
}

pub async fn load_binary(root: &str, file_name: &str) -> AssetResult<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(root, file_name)?;
        fetch(url).await.map_err(|e| AssetError::Fetch {
            source_name: file_name.to_string(),
            message: e.to_string(),
        })?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = std::path::Path::new(root).join(file_name);
        tokio::fs::read(&path).await.map_err(|inner| AssetError::Io {
            source_name: file_name.to_string(),
            inner,
        })?
    };

    Ok(data)
}

/// Decodes an image with the decoder its file extension names.
fn decode_image(name: &str, bytes: &[u8]) -> AssetResult<TextureData> {
    TextureData::from_bytes(name, bytes, extension(name).as_deref())
}

impl AssetLoader {
    /// A png/jpg/... image.
    pub fn texture(&self, source: &str) -> Pending<Arc<TextureData>> {
        self.load(source, |name, bytes| decode_image(name, &bytes).map(Arc::new))
    }

    /// A Radiance `.hdr` equirectangular image as linear radiance.
    pub fn hdr_texture(&self, source: &str) -> Pending<Arc<TextureData>> {
        self.load(source, |name, bytes| TextureData::from_hdr(name, &bytes).map(Arc::new))
    }

    /// Six cube faces in +x, -x, +y, -y, +z, -z order, merged into one
    /// equirectangular texture `width` texels wide.
    pub fn cube_texture(&self, sources: [&str; 6], width: u32) -> Pending<Arc<TextureData>> {
        let loader = self.clone();
        let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        let label = sources[0].clone();
        Pending::from_future(&label.clone(), async move {
            let bytes = futures::future::try_join_all(sources.iter().map(|s| loader.read(s))).await?;
            let decode_label = label.clone();
            loader
                .decode(&label, move || {
                    let faces = sources
                        .iter()
                        .zip(bytes)
                        .map(|(name, bytes)| decode_image(name, &bytes))
                        .collect::<AssetResult<Vec<_>>>()?;
                    let (width0, height0) = (faces[0].width, faces[0].height);
                    if faces.iter().any(|f| f.width != width0 || f.height != height0) {
                        log::warn!("cube map {} has faces of different sizes", decode_label);
                    }
                    let faces: [TextureData; 6] = faces
                        .try_into()
                        .map_err(|_| AssetError::decode(&decode_label, "a cube map needs six faces"))?;
                    Ok(Arc::new(cube_to_equirect(&decode_label, &faces, width)))
                })
                .await
        })
    }
}

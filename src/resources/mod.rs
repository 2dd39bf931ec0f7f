//! Loading of external assets: textures, models, sounds and fonts.
//!
//! Every load returns a [`Pending`] future that resolves exactly once. Reading
//! and decoding never run on the frame path: on native targets the read runs
//! on the tokio runtime and the decode on a blocking thread, on the web the
//! read is a `fetch` spawned on the browser event loop. The lifecycle polls
//! pending loads between frames.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{FutureExt, future::LocalBoxFuture};
use futures_intrusive::channel::shared::{OneshotReceiver, oneshot_channel};
use serde::de::DeserializeOwned;

use crate::{
    audio::{AudioBuffer, AudioFormat},
    data_structures::font::Font,
    error::{AssetError, AssetResult},
};

pub mod animation;
pub mod mesh;
pub mod texture;

pub use texture::load_binary;

/// An asset load in flight.
///
/// Resolves to [`AssetError::Cancelled`] when the worker producing the value
/// went away without answering.
pub struct Pending<T> {
    source: String,
    inner: LocalBoxFuture<'static, Option<AssetResult<T>>>,
}

impl<T: 'static> Pending<T> {
    fn from_receiver(source: &str, receiver: OneshotReceiver<AssetResult<T>>) -> Self {
        Self {
            source: source.to_string(),
            inner: async move { receiver.receive().await }.boxed_local(),
        }
    }

    /// An already settled load.
    pub fn ready(source: &str, result: AssetResult<T>) -> Self {
        Self {
            source: source.to_string(),
            inner: futures::future::ready(Some(result)).boxed_local(),
        }
    }

    /// Wraps a composed load, e.g. one that reads several files.
    pub fn from_future(source: &str, future: impl Future<Output = AssetResult<T>> + 'static) -> Self {
        Self {
            source: source.to_string(),
            inner: future.map(Some).boxed_local(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Pending<U> {
        let source = self.source.clone();
        Pending::from_future(&source, async move { self.await.map(f) })
    }
}

impl<T> Future for Pending<T> {
    type Output = AssetResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.inner
            .as_mut()
            .poll(cx)
            .map(|result| result.unwrap_or_else(|| Err(AssetError::Cancelled(this.source.clone()))))
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending").field("source", &self.source).finish()
    }
}

/// Resolves asset names against the asset root and runs loads off the frame path.
///
/// Cloning is cheap; clones share the runtime.
#[derive(Clone, Debug)]
pub struct AssetLoader {
    root: String,
    #[cfg(not(target_arch = "wasm32"))]
    runtime: tokio::runtime::Handle,
}

impl AssetLoader {
    /// Loader for the crate's `assets` directory as staged by the build script, running its I/O on `runtime`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            root: env!("FLOW_SCENES_ASSETS").to_string(),
            runtime,
        }
    }

    /// Loader for `<origin>/assets`.
    #[cfg(target_arch = "wasm32")]
    pub fn new() -> Self {
        Self {
            root: "assets".to_string(),
        }
    }

    /// Resolves sources against another directory (native) or path below the origin (web).
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Reads `source` and decodes it with `decode`.
    pub fn load<T, D>(&self, source: &str, decode: D) -> Pending<T>
    where
        T: Send + 'static,
        D: FnOnce(&str, Vec<u8>) -> AssetResult<T> + Send + 'static,
    {
        let (sender, receiver) = oneshot_channel();
        let name = source.to_string();

        #[cfg(not(target_arch = "wasm32"))]
        {
            let root = self.root.clone();
            self.runtime.spawn(async move {
                let result = match load_binary(&root, &name).await {
                    Ok(bytes) => {
                        let task_name = name.clone();
                        tokio::task::spawn_blocking(move || decode(&task_name, bytes))
                            .await
                            .unwrap_or_else(|e| Err(AssetError::decode(&name, e)))
                    }
                    Err(e) => Err(e),
                };
                // nobody is listening after a teardown
                let _ = sender.send(result);
            });
        }

        #[cfg(target_arch = "wasm32")]
        {
            let root = self.root.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let result = match load_binary(&root, &name).await {
                    Ok(bytes) => decode(&name, bytes),
                    Err(e) => Err(e),
                };
                let _ = sender.send(result);
            });
        }

        Pending::from_receiver(source, receiver)
    }

    /// Raw bytes of `source`.
    pub fn read(&self, source: &str) -> Pending<Vec<u8>> {
        self.load(source, |_, bytes| Ok(bytes))
    }

    /// Runs CPU heavy work, such as decoding already fetched bytes, off the frame path.
    pub fn decode<T, W>(&self, name: &str, work: W) -> Pending<T>
    where
        T: Send + 'static,
        W: FnOnce() -> AssetResult<T> + Send + 'static,
    {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let (sender, receiver) = oneshot_channel();
            let task_name = name.to_string();
            let join = self.runtime.spawn_blocking(work);
            self.runtime.spawn(async move {
                let result = join
                    .await
                    .unwrap_or_else(|e| Err(AssetError::decode(&task_name, e)));
                let _ = sender.send(result);
            });
            Pending::from_receiver(name, receiver)
        }

        #[cfg(target_arch = "wasm32")]
        {
            Pending::ready(name, work())
        }
    }

    /// A sound file, kept encoded.
    pub fn audio(&self, source: &str) -> Pending<Arc<AudioBuffer>> {
        self.load(source, |name, bytes| {
            let format = AudioFormat::sniff(&bytes);
            if format == AudioFormat::Unknown {
                return Err(AssetError::unsupported(name, "not a known audio container"));
            }
            Ok(Arc::new(AudioBuffer {
                name: name.to_string(),
                format,
                bytes,
            }))
        })
    }

    /// A typeface JSON font.
    pub fn font(&self, source: &str) -> Pending<Arc<Font>> {
        self.json::<Font>(source).map(Arc::new)
    }

    /// Any JSON document.
    pub fn json<T>(&self, source: &str) -> Pending<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.load(source, |name, bytes| {
            serde_json::from_slice(&bytes).map_err(|e| AssetError::decode(name, e))
        })
    }
}

/// Extension of a source name, lower-cased.
pub(crate) fn extension(source: &str) -> Option<String> {
    let file = source.rsplit('/').next().unwrap_or(source);
    file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// `relative` resolved against the directory of `source`, as model files reference their siblings.
pub(crate) fn sibling(source: &str, relative: &str) -> String {
    match source.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{relative}"),
        None => relative.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_and_siblings() {
        assert_eq!(extension("models/Robot.GLB").as_deref(), Some("glb"));
        assert_eq!(extension("cube/px"), None);
        assert_eq!(sibling("models/robot.gltf", "robot.bin"), "models/robot.bin");
        assert_eq!(sibling("robot.gltf", "robot.bin"), "robot.bin");
    }

    #[test]
    fn ready_and_mapped_loads_resolve() {
        let pending = Pending::ready("a", Ok(2)).map(|v| v * 21);
        assert_eq!(pending.source(), "a");
        assert_eq!(futures::executor::block_on(pending).ok(), Some(42));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn default_root_is_the_staged_asset_directory() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
        let loader = AssetLoader::new(runtime.handle().clone());
        let root = std::path::Path::new(loader.root());
        assert!(root.is_absolute(), "{}", loader.root());
        assert!(root.ends_with("assets"));
        assert_eq!(loader.with_root("elsewhere").root(), "elsewhere");
    }

    #[test]
    fn dropped_sender_resolves_as_cancelled() {
        let (sender, receiver) = oneshot_channel::<AssetResult<u8>>();
        drop(sender);
        let result = futures::executor::block_on(Pending::from_receiver("gone.png", receiver));
        assert!(matches!(result, Err(AssetError::Cancelled(name)) if name == "gone.png"));
    }
}

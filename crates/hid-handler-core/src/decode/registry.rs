//! Name-keyed table of report decoders.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    GenericDecoder, KeyboardDecoder, MouseDecoder, NumpadDecoder, PresenterDecoder, ReportDecoder,
    TouchpadDecoder,
};
use crate::domain::device::DeviceType;
use crate::error::HandlerError;

/// Maps `{Type}Event` names to decoders.
///
/// Resolution of a type without a registered decoder falls back to the
/// generic decoder.
pub struct DecoderRegistry {
    decoders: BTreeMap<String, Arc<dyn ReportDecoder>>,
    fallback: Arc<dyn ReportDecoder>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DecoderRegistry {
    /// An empty registry; every type resolves to the generic decoder.
    pub fn empty() -> Self {
        Self {
            decoders: BTreeMap::new(),
            fallback: Arc::new(GenericDecoder),
        }
    }

    /// Registry holding the built-in decoders for every [`DeviceType`]
    /// except [`DeviceType::Other`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let builtins: [Arc<dyn ReportDecoder>; 6] = [
            Arc::new(GenericDecoder),
            Arc::new(KeyboardDecoder),
            Arc::new(MouseDecoder),
            Arc::new(TouchpadDecoder),
            Arc::new(NumpadDecoder),
            Arc::new(PresenterDecoder),
        ];
        for decoder in builtins {
            let name = decoder.name();
            registry.decoders.insert(name, decoder);
        }
        registry
    }

    /// Registers `decoder` under `name`, or under its own
    /// [`ReportDecoder::name`] when `name` is `None`.
    ///
    /// # Errors
    ///
    /// [`HandlerError::NameCollision`] if the name is taken.
    pub fn register(
        &mut self,
        decoder: Arc<dyn ReportDecoder>,
        name: Option<&str>,
    ) -> Result<(), HandlerError> {
        let name = name.map(str::to_owned).unwrap_or_else(|| decoder.name());
        if self.decoders.contains_key(&name) {
            return Err(HandlerError::NameCollision(name));
        }
        debug!("register event decoder \"{name}\"");
        self.decoders.insert(name, decoder);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ReportDecoder>> {
        self.decoders.get(name).cloned()
    }

    /// Decoder for `device_type`, the generic decoder if none is registered.
    pub fn resolve(&self, device_type: &DeviceType) -> Arc<dyn ReportDecoder> {
        self.get(&device_type.decoder_name())
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn names(&self) -> Vec<&str> {
        self.decoders.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }
}

//! Persisted descriptor format and reconstruction registry: a serializable
//! handle to a backend that can be reconstructed in another process, the
//! nearest Rust analogue of a dynamic class-path import — a process-local
//! registry of constructor closures keyed by protocol, consulted by
//! `from_descriptor`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::backend::Backend;
use crate::error::{FsError, Result};
use crate::instance_cache::{compute_token, get_or_construct};

/// `cls` (fully-qualified type name), `protocol`, `args`, plus arbitrary
/// keyword options — a JSON-shaped descriptor object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsDescriptor {
    pub cls: String,
    pub protocol: String,
    pub args: Vec<String>,
    pub options: BTreeMap<String, String>,
}

impl FsDescriptor {
    pub fn new(cls: impl Into<String>, protocol: impl Into<String>) -> Self {
        FsDescriptor {
            cls: cls.into(),
            protocol: protocol.into(),
            args: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Render to a flat `key=value` text form, the Rust counterpart of
    /// `to_json` (no `serde_json` dependency is added solely for this).
    pub fn to_text(&self) -> String {
        let mut out = format!("cls={}\nprotocol={}\n", self.cls, self.protocol);
        for (i, a) in self.args.iter().enumerate() {
            out.push_str(&format!("arg[{i}]={a}\n"));
        }
        for (k, v) in &self.options {
            out.push_str(&format!("opt.{k}={v}\n"));
        }
        out
    }

    pub fn from_text(text: &str) -> Result<Self> {
        let mut cls = None;
        let mut protocol = None;
        let mut args = Vec::new();
        let mut options = BTreeMap::new();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key == "cls" {
                cls = Some(value.to_string());
            } else if key == "protocol" {
                protocol = Some(value.to_string());
            } else if let Some(rest) = key.strip_prefix("opt.") {
                options.insert(rest.to_string(), value.to_string());
            } else if key.starts_with("arg[") {
                args.push(value.to_string());
            }
        }
        Ok(FsDescriptor {
            cls: cls.ok_or_else(|| FsError::InvalidArgument("missing cls".into()))?,
            protocol: protocol.ok_or_else(|| FsError::InvalidArgument("missing protocol".into()))?,
            args,
            options,
        })
    }
}

type Constructor = Box<dyn Fn(&FsDescriptor) -> Result<Arc<dyn Backend>> + Send + Sync>;

fn registry() -> &'static Mutex<BTreeMap<String, Constructor>> {
    static REGISTRY: OnceLock<Mutex<BTreeMap<String, Constructor>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(BTreeMap::new()))
}

fn option_pairs(options: &BTreeMap<String, String>) -> Vec<(&str, &str)> {
    options.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

/// The process-local reconstruction registry: maps a protocol name to a
/// constructor, and routes reconstruction through the instance cache so
/// `from_descriptor` called twice with an equal descriptor hands back the
/// same handle rather than building a second one.
pub struct FsRegistry;

impl FsRegistry {
    /// Register a constructor for `protocol`. Call once per backend type the
    /// process knows how to reconstruct from a descriptor. `ctor` builds a
    /// fresh `T`; the registry itself takes care of deduplication.
    pub fn register<T, F>(protocol: &str, ctor: F)
    where
        T: Backend + Send + Sync + 'static,
        F: Fn(&FsDescriptor) -> Result<T> + Send + Sync + 'static,
    {
        let boxed: Constructor = Box::new(move |descriptor: &FsDescriptor| {
            let token = compute_token::<T>(&descriptor.args.join("\u{1}"), &option_pairs(&descriptor.options));
            let owned = descriptor.clone();
            let instance = get_or_construct::<T, _>(token, false, move || ctor(&owned))?;
            Ok(instance as Arc<dyn Backend>)
        });
        registry().lock().unwrap().insert(protocol.to_string(), boxed);
    }

    /// Reconstruct a handle from `descriptor`, locating the constructor by
    /// `protocol` (the `cls` field is preserved for round-trip fidelity but
    /// not used for lookup, since Rust has no dynamic class loader).
    pub fn from_descriptor(descriptor: &FsDescriptor) -> Result<Arc<dyn Backend>> {
        let guard = registry().lock().unwrap();
        let ctor = guard.get(&descriptor.protocol).ok_or_else(|| {
            FsError::NotImplemented(format!("no registered constructor for protocol {}", descriptor.protocol))
        })?;
        ctor(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFilesystem;

    #[test]
    fn descriptor_text_round_trips() {
        let d = FsDescriptor::new("omnifs::memory::MemoryFilesystem", "mem")
            .with_arg("root")
            .with_option("use_listings_cache", "true");
        let text = d.to_text();
        let back = FsDescriptor::from_text(&text).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn unregistered_protocol_is_not_implemented() {
        let d = FsDescriptor::new("x", "no-such-protocol-test-only");
        let err = FsRegistry::from_descriptor(&d).unwrap_err();
        assert!(matches!(err, FsError::NotImplemented(_)));
    }

    #[test]
    fn from_descriptor_dedups_through_instance_cache() {
        crate::instance_cache::clear_instance_cache();
        FsRegistry::register::<MemoryFilesystem, _>("mem-registry-test", |_d| {
            Ok(MemoryFilesystem::default())
        });
        let d = FsDescriptor::new("omnifs::memory::MemoryFilesystem", "mem-registry-test");
        let a = FsRegistry::from_descriptor(&d).unwrap();
        let b = FsRegistry::from_descriptor(&d).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}

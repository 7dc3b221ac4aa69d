//! Cloud instance bookkeeping
//!
//! Instances referenced by cloud projects are tracked in a registry
//! persisted next to the settings file. The registry is flushed when a
//! non-temporary project closes and hydrated into the topology when a
//! cloud project is opened.

use crate::model::TopologyInstance;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Current registry version for migration support
pub const REGISTRY_VERSION: u32 = 1;

/// A provider instance known to this machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudInstance {
    /// Provider-assigned instance ID
    pub id: String,
    pub name: String,
    pub size_id: String,
    pub image_id: String,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
}

impl CloudInstance {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        size_id: impl Into<String>,
        image_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size_id: size_id.into(),
            image_id: image_id.into(),
            public_key: None,
            private_key: None,
        }
    }

    pub fn with_keypair(mut self, public_key: String, private_key: String) -> Self {
        self.public_key = Some(public_key);
        self.private_key = Some(private_key);
        self
    }

    /// Reference form stored inside a project descriptor
    pub fn to_topology_instance(&self) -> TopologyInstance {
        TopologyInstance {
            id: self.id.clone(),
            name: self.name.clone(),
            size_id: self.size_id.clone(),
            image_id: self.image_id.clone(),
        }
    }
}

/// Registry of cloud instances
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudInstances {
    pub version: u32,
    pub instances: HashMap<String, CloudInstance>,
}

impl CloudInstances {
    /// Get the default registry path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("netlab")
            .join("cloud_instances.toml")
    }

    /// Load registry from file, or create empty if not exists
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            let registry = Self::default();
            registry.save()?;
            Ok(registry)
        }
    }

    /// Load registry from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let registry: Self = toml::from_str(&content)?;
        Ok(registry)
    }

    /// Save registry to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        self.save_to(&path)
    }

    /// Save registry to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Add an instance to the registry
    pub fn add(&mut self, instance: CloudInstance) -> Result<()> {
        if self.instances.contains_key(&instance.id) {
            return Err(Error::AlreadyExists(format!(
                "Cloud instance with ID '{}' already exists",
                instance.id
            )));
        }
        self.instances.insert(instance.id.clone(), instance);
        Ok(())
    }

    /// Remove an instance by ID
    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.instances
            .remove(id)
            .ok_or_else(|| Error::not_found(format!("Cloud instance with ID '{}' not found", id)))?;
        Ok(())
    }

    /// Get an instance by ID
    pub fn get(&self, id: &str) -> Option<&CloudInstance> {
        self.instances.get(id)
    }

    /// List all instances
    pub fn list(&self) -> Vec<&CloudInstance> {
        self.instances.values().collect()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Reference forms for embedding in a project descriptor
    pub fn to_topology_instances(&self) -> Vec<TopologyInstance> {
        self.instances
            .values()
            .map(CloudInstance::to_topology_instance)
            .collect()
    }
}

//! Ordered catalog of manageable services

use crate::error::{DeployError, Result};
use bosun_types::{Service, ServiceKind, ServiceName};

/// Every service the orchestrator can manage, in deployment order
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: Vec<Service>,
}

impl ServiceCatalog {
    /// Sort by priority (descending); ties keep their given order
    pub fn new(mut services: Vec<Service>) -> Self {
        services.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { services }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn get(&self, name: &ServiceName) -> Option<&Service> {
        self.services.iter().find(|s| &s.name == name)
    }

    /// First service with the given kind
    pub fn by_kind(&self, kind: ServiceKind) -> Option<&Service> {
        self.services.iter().find(|s| s.kind == kind)
    }

    /// The requested services in priority order; an empty request means all
    pub fn prioritized(&self, requested: &[ServiceName]) -> Result<Vec<Service>> {
        if requested.is_empty() {
            return Ok(self.services.clone());
        }

        if let Some(unknown) = requested.iter().find(|name| self.get(name).is_none()) {
            return Err(DeployError::UnknownService(unknown.clone()));
        }

        Ok(self
            .services
            .iter()
            .filter(|s| requested.contains(&s.name))
            .cloned()
            .collect())
    }

    /// The requested services in the order they were requested
    pub fn resolve(&self, requested: &[ServiceName]) -> Result<Vec<Service>> {
        if requested.is_empty() {
            return Ok(self.services.clone());
        }
        requested
            .iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| DeployError::UnknownService(name.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::new(vec![
            Service::new("deck", 10),
            Service::new("redis", 100).with_kind(ServiceKind::CacheStore),
            Service::new("gate", 10),
            Service::new("orca", 50).with_kind(ServiceKind::PipelineRunner),
        ])
    }

    fn names(services: &[Service]) -> Vec<&str> {
        services.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_priority_order_is_stable() {
        assert_eq!(names(catalog().services()), vec!["redis", "orca", "deck", "gate"]);
    }

    #[test]
    fn test_prioritized_subset() {
        let catalog = catalog();
        let services = catalog
            .prioritized(&["gate".into(), "redis".into()])
            .unwrap();
        assert_eq!(names(&services), vec!["redis", "gate"]);
        assert_eq!(catalog.prioritized(&[]).unwrap().len(), 4);
    }

    #[test]
    fn test_unknown_service_is_rejected() {
        let err = catalog().prioritized(&["clouddriver".into()]).unwrap_err();
        assert!(matches!(err, DeployError::UnknownService(name) if name.as_str() == "clouddriver"));
    }

    #[test]
    fn test_resolve_keeps_request_order() {
        let services = catalog().resolve(&["gate".into(), "redis".into()]).unwrap();
        assert_eq!(names(&services), vec!["gate", "redis"]);
    }

    #[test]
    fn test_by_kind() {
        let catalog = catalog();
        assert_eq!(
            catalog.by_kind(ServiceKind::PipelineRunner).map(|s| s.name.as_str()),
            Some("orca")
        );
        assert!(catalog.by_kind(ServiceKind::ImageBaker).is_none());
    }
}

//! Ingress-backed endpoint source.
//!
//! Endpoints are the hosts published in `spec.rules[].host` of the selected
//! Ingress objects. Each call lists them afresh so host changes are picked up
//! on the next pass.

use crate::config::IngressSelection;
use endpoint_check::{EndpointSource, SourceError};
use k8s_openapi::api::networking::v1::Ingress;
use kube::Api;
use kube::api::ListParams;
use tracing::debug;

/// Lists endpoints from Ingress objects in one namespace
#[derive(Clone)]
pub struct IngressEndpointSource {
    api: Api<Ingress>,
    selection: IngressSelection,
}

impl IngressEndpointSource {
    /// Creates a source over `api` for the selected Ingresses.
    pub fn new(api: Api<Ingress>, selection: IngressSelection) -> Self {
        Self { api, selection }
    }

    /// Fetch the selected Ingresses
    ///
    /// Named Ingresses come back in configured order; a missing one is an
    /// error. Selector matches come back in API order.
    pub async fn ingresses(&self) -> Result<Vec<Ingress>, kube::Error> {
        match &self.selection {
            IngressSelection::Names(names) => {
                let mut ingresses = Vec::with_capacity(names.len());
                for name in names {
                    ingresses.push(self.api.get(name).await?);
                }
                Ok(ingresses)
            }
            IngressSelection::LabelSelector(selector) => {
                let list = self.api.list(&ListParams::default().labels(selector)).await?;
                Ok(list.items)
            }
        }
    }
}

impl std::fmt::Debug for IngressEndpointSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressEndpointSource")
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl EndpointSource for IngressEndpointSource {
    async fn endpoints(&self) -> Result<Vec<String>, SourceError> {
        let ingresses = self.ingresses().await.map_err(SourceError::from)?;
        let hosts: Vec<String> = ingresses.iter().flat_map(ingress_hosts).collect();
        debug!("Listed {} endpoints from {} Ingresses", hosts.len(), ingresses.len());
        Ok(hosts)
    }
}

/// Hosts of an Ingress, in rule order, skipping rules without one
pub fn ingress_hosts(ingress: &Ingress) -> Vec<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| rule.host.as_deref())
                .filter(|host| !host.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1::{IngressRule, IngressSpec};
    use kube::api::ObjectMeta;

    pub(crate) fn ingress(name: &str, hosts: &[Option<&str>]) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(IngressSpec {
                rules: Some(
                    hosts
                        .iter()
                        .map(|host| IngressRule {
                            host: host.map(String::from),
                            ..IngressRule::default()
                        })
                        .collect(),
                ),
                ..IngressSpec::default()
            }),
            ..Ingress::default()
        }
    }

    #[test]
    fn test_hosts_in_rule_order() {
        let ingress = ingress(
            "oauth",
            &[Some("oauth.apps.example.com"), Some("console.apps.example.com")],
        );
        assert_eq!(
            ingress_hosts(&ingress),
            vec!["oauth.apps.example.com", "console.apps.example.com"]
        );
    }

    #[test]
    fn test_rules_without_host_are_skipped() {
        let ingress = ingress("mixed", &[None, Some("a.example.com"), Some("")]);
        assert_eq!(ingress_hosts(&ingress), vec!["a.example.com"]);
    }

    #[test]
    fn test_ingress_without_spec_has_no_hosts() {
        assert!(ingress_hosts(&Ingress::default()).is_empty());

        let no_rules = Ingress {
            spec: Some(IngressSpec::default()),
            ..Ingress::default()
        };
        assert!(ingress_hosts(&no_rules).is_empty());
    }
}

//! Inputs shared by every policy rule.

use crate::config::Config;
use crate::namespace::NamespaceContext;
use crate::resource::{ContainerGroup, ResourceView};

use super::address::Address;

/// Everything a rule may look at. Rules never see the raw document.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub view: &'a ResourceView,
    pub namespace: &'a NamespaceContext,
    pub config: &'a Config,
}

impl<'a> RuleContext<'a> {
    pub fn new(view: &'a ResourceView, namespace: &'a NamespaceContext, config: &'a Config) -> Self {
        Self {
            view,
            namespace,
            config,
        }
    }

    pub fn metadata(&self) -> Address {
        Address::metadata(self.view.origin)
    }

    pub fn labels(&self) -> Address {
        self.metadata().field("labels")
    }

    pub fn annotation(&self, key: &str) -> Address {
        self.metadata().field("annotations").key(key)
    }

    pub fn pod_spec(&self) -> Address {
        Address::pod_spec(self.view.origin)
    }

    pub fn container(&self, group: ContainerGroup, index: usize) -> Address {
        Address::container(self.view.origin, group, index)
    }
}

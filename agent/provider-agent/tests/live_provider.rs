use agent_common::credentials::CredentialStore;
use maplit::btreemap;
use provider_agent::error::AgentError;
use provider_agent::provider::{ProviderState, Remnant};
use provider_agent::{ProviderFactory, WaitSettings};
use provsys_model::Catalog;
use selftest::{credentials, sample_catalog, Call, FakeAppliance};
use std::sync::Arc;

fn factory(appliance: &Arc<FakeAppliance>) -> ProviderFactory {
    ProviderFactory::new(appliance.clone(), Arc::new(credentials()))
        .with_wait_settings(WaitSettings::immediate())
}

fn descriptor(catalog: &Catalog, key: &str) -> Arc<provsys_model::ProviderDescriptor> {
    Arc::new(catalog.get(key).unwrap().clone())
}

#[test]
fn endpoints_and_credentials_are_resolved() {
    let catalog = sample_catalog();
    let appliance = Arc::new(FakeAppliance::default());
    let rhv1 = factory(&appliance)
        .materialize(descriptor(&catalog, "rhv1"))
        .unwrap();

    assert_eq!(rhv1.endpoints().len(), 2);
    let candu = &rhv1.endpoints()["candu"];
    assert_eq!(candu.hostname.as_deref(), Some("rhv1-db.example.com"));
    assert_eq!(candu.port, Some(5432));
    assert_eq!(candu.credential.as_ref().unwrap().principal, "cloudforms");

    let payload = rhv1.payload();
    assert_eq!(payload.name, "rhv-43");
    assert_eq!(payload.db_type, "ManageIQ::Providers::Redhat::InfraManager");
    assert_eq!(payload.connection_configurations.len(), 2);
    assert_eq!(rhv1.state(), ProviderState::Unconfigured);
}

#[test]
fn unknown_credentials_are_config_errors() {
    let catalog = sample_catalog();
    let appliance = Arc::new(FakeAppliance::default());
    let factory = ProviderFactory::new(appliance, Arc::new(CredentialStore::default()));
    let error = factory
        .materialize(descriptor(&catalog, "vc1"))
        .unwrap_err();
    assert!(matches!(error, AgentError::Credentials(_)));
    assert!(error.to_string().contains("vsphere"));
}

#[tokio::test]
async fn lifecycle_on_the_appliance() {
    let catalog = sample_catalog();
    let appliance = Arc::new(FakeAppliance::default());
    let vc1 = factory(&appliance)
        .materialize(descriptor(&catalog, "vc1"))
        .unwrap();

    vc1.setup().await.unwrap();
    assert_eq!(vc1.state(), ProviderState::Configured);
    assert!(vc1.exists().await.unwrap());
    // Setting up again finds the provider and does not create it twice.
    vc1.setup().await.unwrap();
    assert_eq!(appliance.created().len(), 1);

    vc1.wait_for_refresh().await.unwrap();
    assert!(vc1.is_refreshed(None).await.unwrap());
    assert_eq!(vc1.hosts().await.unwrap(), vec!["vsphere-67-host-1".to_string()]);

    assert!(vc1.delete_if_exists().await.unwrap());
    assert_eq!(vc1.state(), ProviderState::Deleted);
    assert!(!vc1.delete_if_exists().await.unwrap());
    assert!(appliance.calls().contains(&Call::Refresh {
        name: "vsphere-67".to_string()
    }));
}

#[tokio::test]
async fn stats_are_compared_with_the_appliance() {
    let catalog = sample_catalog();
    let appliance = Arc::new(FakeAppliance::default());
    let vc1 = factory(&appliance)
        .materialize(descriptor(&catalog, "vc1"))
        .unwrap();
    vc1.setup().await.unwrap();
    appliance.set_stats("vsphere-67", btreemap! {"num_vm".to_string() => 10});

    vc1.validate_stats(&btreemap! {"num_vm".to_string() => 10})
        .await
        .unwrap();
    let error = vc1
        .validate_stats(&btreemap! {"num_vm".to_string() => 11, "num_host".to_string() => 2})
        .await
        .unwrap_err();
    assert_eq!(error.remnant(), Remnant::Remaining);
    assert!(error.to_string().contains("num_vm expected 11 found 10"));
    assert!(error.to_string().contains("num_host expected 2 found nothing"));
}

#[tokio::test]
async fn unsupported_operations_fail() {
    let catalog = sample_catalog();
    let appliance = Arc::new(FakeAppliance::default());
    let ec2 = factory(&appliance)
        .materialize(descriptor(&catalog, "ec2west"))
        .unwrap();
    let error = ec2.hosts().await.unwrap_err();
    assert_eq!(error.remnant(), Remnant::Clear);
    assert!(error.to_string().contains("does not support hosts"));

    let scvmm = factory(&appliance)
        .materialize(descriptor(&catalog, "scvmm_old"))
        .unwrap();
    assert!(scvmm.create_rest().await.is_err());
    assert!(appliance.created().is_empty());
}

#[tokio::test]
async fn failed_creation_resets_the_state() {
    let catalog = sample_catalog();
    let appliance = Arc::new(FakeAppliance::default());
    appliance.set_unreachable(true);
    let vc1 = factory(&appliance)
        .materialize(descriptor(&catalog, "vc1"))
        .unwrap();
    let error = vc1.create_rest().await.unwrap_err();
    assert_eq!(error.remnant(), Remnant::Unknown);
    assert_eq!(vc1.state(), ProviderState::Unconfigured);
}

use agent_common::credentials::CredentialStore;
use provsys_model::Catalog;

/// Two vSphere providers and one RHV provider.
pub const SCENARIO_CATALOG: &str = r#"
management_systems:
  vc1:
    name: vsphere-67
    type: virtualcenter
    version: '6.7'
    endpoints:
      default:
        hostname: vc1.example.com
        credentials: vsphere
    templates:
      small_template: {name: small_vm, creds: guest}
      big_template: {name: big_vm, creds: guest}
    provisioning:
      template: small_vm
      host: esx1.example.com
      datastore: nfs-datastore
  vc2:
    name: vsphere-70
    type: virtualcenter
    version: '7.0'
    endpoints:
      default:
        hostname: vc2.example.com
        credentials: vsphere
    templates:
      small_template: {name: small_vm, creds: guest}
  rhv1:
    name: rhv-43
    type: rhevm
    version: '4.3'
    endpoints:
      default:
        hostname: rhv1.example.com
        credentials: rhv
      candu:
        hostname: rhv1-db.example.com
        credentials: rhv_candu
        api_port: 5432
    templates:
      small_template: {name: rhel7-small, creds: guest}
"#;

/// Providers beyond the scenario catalog: a cloud provider with a region, a provider nobody should
/// prefer, a performance provider and a disabled one.
pub const EXTRA_PROVIDERS: &str = r#"
management_systems:
  ec2west:
    name: ec2-us-west
    type: ec2
    region: us-west-1
    endpoints:
      default:
        credentials: aws
  osp13:
    name: osp-13
    type: openstack
    version: '13'
    tags: [do_not_prefer]
    endpoints:
      default:
        hostname: osp13.example.com
        credentials: osp
      events:
        hostname: osp13.example.com
        event_stream: amqp
  vcperf:
    name: vsphere-perf
    type: virtualcenter
    version: '6.5'
    tags: [perf]
    endpoints:
      default:
        hostname: vcperf.example.com
        credentials: vsphere
  scvmm_old:
    name: scvmm-2012
    type: scvmm
    version: '2012'
    tags: [disabled]
    endpoints:
      default:
        hostname: scvmm.example.com
        credentials: scvmm
"#;

pub const CREDENTIALS: &str = r#"
vsphere: {username: administrator@vsphere.local, password: vsphere-secret}
rhv: {username: admin@internal, password: rhv-secret}
rhv_candu: {username: cloudforms, password: candu-secret}
aws: {principal: AKIAEXAMPLE, secret: aws-secret}
osp: {username: admin, password: osp-secret}
scvmm: {username: administrator, password: scvmm-secret}
guest: {username: root, password: guest-secret}
"#;

/// The catalog `[vc1, vc2, rhv1]`.
pub fn scenario_catalog() -> Catalog {
    Catalog::from_yaml_str(SCENARIO_CATALOG).expect("the scenario catalog is valid")
}

/// The scenario catalog followed by [`EXTRA_PROVIDERS`].
pub fn sample_catalog() -> Catalog {
    let layers = vec![
        serde_yaml_value(SCENARIO_CATALOG),
        serde_yaml_value(EXTRA_PROVIDERS),
    ];
    Catalog::from_layers(layers).expect("the sample catalog is valid")
}

pub fn credentials() -> CredentialStore {
    CredentialStore::from_yaml_str(CREDENTIALS).expect("the sample credentials are valid")
}

fn serde_yaml_value(yaml: &str) -> serde_json::Value {
    serde_yaml::from_str(yaml).expect("sample YAML is valid")
}

use crate::error::{self, Error};
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The broad family a provider belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Infra,
    Cloud,
}

derive_fromstr_from_deserialize!(Category, |e| -> Error {
    error::OpaqueError::SerdePlain { source: e }.into()
});
derive_display_from_serialize!(Category);

impl Category {
    pub fn all() -> &'static [Category] {
        &[Category::Infra, Category::Cloud]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Infra => "infra",
            Category::Cloud => "cloud",
        }
    }
}

/// The set of operations a provider class supports on the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub create: bool,
    pub create_rest: bool,
    pub delete: bool,
    pub refresh: bool,
    pub exists: bool,
    pub validate_stats: bool,
    pub wait_for_delete: bool,
    pub hosts: bool,
    pub templates: bool,
    /// Whether the provider is bound to a region that the appliance can disable.
    pub regions: bool,
}

impl Capabilities {
    const fn common() -> Self {
        Self {
            create: true,
            create_rest: true,
            delete: true,
            refresh: true,
            exists: true,
            validate_stats: true,
            wait_for_delete: true,
            hosts: false,
            templates: true,
            regions: false,
        }
    }
}

/// One entry of a provider class' endpoint form: the endpoint name and the keys that must be
/// present in its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSchema {
    pub name: &'static str,
    pub required: &'static [&'static str],
}

const HOSTNAME: &[&str] = &["hostname"];
const NOTHING: &[&str] = &[];

/// The provider taxonomy. Each variant is a concrete provider type that the appliance knows how to
/// manage. Behavior differs only through the static description each variant declares, see
/// [`Capabilities`] and [`EndpointSchema`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProviderClass {
    #[serde(rename = "virtualcenter")]
    VirtualCenter,
    Rhevm,
    Openstack,
    Ec2,
    Azure,
    Gce,
    Scvmm,
    OpenstackInfra,
}

derive_fromstr_from_deserialize!(ProviderClass, |e| -> Error {
    error::OpaqueError::SerdePlain { source: e }.into()
});
derive_display_from_serialize!(ProviderClass);

impl ProviderClass {
    pub fn all() -> &'static [ProviderClass] {
        &[
            ProviderClass::VirtualCenter,
            ProviderClass::Rhevm,
            ProviderClass::Openstack,
            ProviderClass::Ec2,
            ProviderClass::Azure,
            ProviderClass::Gce,
            ProviderClass::Scvmm,
            ProviderClass::OpenstackInfra,
        ]
    }

    /// The `type` value used for this class in the catalog.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProviderClass::VirtualCenter => "virtualcenter",
            ProviderClass::Rhevm => "rhevm",
            ProviderClass::Openstack => "openstack",
            ProviderClass::Ec2 => "ec2",
            ProviderClass::Azure => "azure",
            ProviderClass::Gce => "gce",
            ProviderClass::Scvmm => "scvmm",
            ProviderClass::OpenstackInfra => "openstack_infra",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ProviderClass::VirtualCenter
            | ProviderClass::Rhevm
            | ProviderClass::Scvmm
            | ProviderClass::OpenstackInfra => Category::Infra,
            ProviderClass::Openstack
            | ProviderClass::Ec2
            | ProviderClass::Azure
            | ProviderClass::Gce => Category::Cloud,
        }
    }

    /// The discriminators the appliance database uses for this class. The first one is used when
    /// creating a provider.
    pub fn db_types(&self) -> &'static [&'static str] {
        match self {
            ProviderClass::VirtualCenter => &["ManageIQ::Providers::Vmware::InfraManager"],
            ProviderClass::Rhevm => &[
                "ManageIQ::Providers::Redhat::InfraManager",
                "ManageIQ::Providers::Ovirt::InfraManager",
            ],
            ProviderClass::Openstack => &["ManageIQ::Providers::Openstack::CloudManager"],
            ProviderClass::Ec2 => &["ManageIQ::Providers::Amazon::CloudManager"],
            ProviderClass::Azure => &["ManageIQ::Providers::Azure::CloudManager"],
            ProviderClass::Gce => &["ManageIQ::Providers::Google::CloudManager"],
            ProviderClass::Scvmm => &["ManageIQ::Providers::Microsoft::InfraManager"],
            ProviderClass::OpenstackInfra => &["ManageIQ::Providers::Openstack::InfraManager"],
        }
    }

    pub fn endpoints_form(&self) -> &'static [EndpointSchema] {
        match self {
            ProviderClass::VirtualCenter | ProviderClass::Scvmm => &[EndpointSchema {
                name: "default",
                required: HOSTNAME,
            }],
            ProviderClass::Rhevm => &[
                EndpointSchema {
                    name: "default",
                    required: HOSTNAME,
                },
                EndpointSchema {
                    name: "candu",
                    required: HOSTNAME,
                },
                EndpointSchema {
                    name: "metrics",
                    required: HOSTNAME,
                },
            ],
            ProviderClass::Openstack | ProviderClass::OpenstackInfra => &[
                EndpointSchema {
                    name: "default",
                    required: HOSTNAME,
                },
                EndpointSchema {
                    name: "events",
                    required: HOSTNAME,
                },
                EndpointSchema {
                    name: "ssh",
                    required: NOTHING,
                },
            ],
            ProviderClass::Ec2 | ProviderClass::Azure | ProviderClass::Gce => &[EndpointSchema {
                name: "default",
                required: NOTHING,
            }],
        }
    }

    /// The catalog item type used when building service catalog items on this provider.
    pub fn catalog_item_type(&self) -> Option<&'static str> {
        match self {
            ProviderClass::VirtualCenter => Some("VMware"),
            ProviderClass::Rhevm => Some("RHEV"),
            ProviderClass::Openstack => Some("OpenStack"),
            ProviderClass::Ec2 => Some("Amazon"),
            ProviderClass::Azure => Some("Azure"),
            ProviderClass::Gce => Some("Google"),
            ProviderClass::Scvmm => Some("SCVMM"),
            ProviderClass::OpenstackInfra => None,
        }
    }

    pub fn ems_pretty_name(&self) -> &'static str {
        match self {
            ProviderClass::VirtualCenter => "VMware vCenter",
            ProviderClass::Rhevm => "Red Hat Virtualization",
            ProviderClass::Openstack => "OpenStack",
            ProviderClass::Ec2 => "Amazon EC2",
            ProviderClass::Azure => "Azure",
            ProviderClass::Gce => "Google Compute Engine",
            ProviderClass::Scvmm => "Microsoft System Center VMM",
            ProviderClass::OpenstackInfra => "OpenStack Platform Director",
        }
    }

    /// The key of this class in the appliance's advanced settings (`ems` section).
    pub fn settings_key(&self) -> &'static str {
        match self {
            ProviderClass::VirtualCenter => "ems_vmware",
            ProviderClass::Rhevm => "ems_redhat",
            ProviderClass::Openstack => "ems_openstack",
            ProviderClass::Ec2 => "ems_amazon",
            ProviderClass::Azure => "ems_azure",
            ProviderClass::Gce => "ems_google",
            ProviderClass::Scvmm => "ems_scvmm",
            ProviderClass::OpenstackInfra => "ems_openstack_infra",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let common = Capabilities::common();
        match self {
            ProviderClass::VirtualCenter | ProviderClass::Rhevm | ProviderClass::OpenstackInfra => {
                Capabilities {
                    hosts: true,
                    ..common
                }
            }
            ProviderClass::Scvmm => Capabilities {
                hosts: true,
                create_rest: false,
                validate_stats: false,
                ..common
            },
            ProviderClass::Openstack => common,
            ProviderClass::Ec2 | ProviderClass::Azure | ProviderClass::Gce => Capabilities {
                regions: true,
                ..common
            },
        }
    }

    /// Whether this class is `class_ref` or one of its descendants.
    pub fn is_a(&self, class_ref: &ClassRef) -> bool {
        match class_ref {
            ClassRef::Base => true,
            ClassRef::Category(category) => self.category() == *category,
            ClassRef::Type(class) => self == class,
        }
    }
}

/// A node of the provider taxonomy as seen by filters: the root, one of the categories, or a
/// concrete class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassRef {
    Base,
    Category(Category),
    Type(ProviderClass),
}

impl ClassRef {
    /// Whether selecting by this reference pins down a concrete provider type.
    pub fn is_concrete(&self) -> bool {
        matches!(self, ClassRef::Type(_))
    }

    /// The name used for fixtures generated for this reference, e.g. `infra` in `infra_provider`.
    pub fn fixture_stem(&self) -> &'static str {
        match self {
            ClassRef::Base => "any",
            ClassRef::Category(category) => category.as_str(),
            ClassRef::Type(class) => class.type_name(),
        }
    }
}

impl From<ProviderClass> for ClassRef {
    fn from(class: ProviderClass) -> Self {
        ClassRef::Type(class)
    }
}

impl From<Category> for ClassRef {
    fn from(category: Category) -> Self {
        ClassRef::Category(category)
    }
}

impl FromStr for ClassRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let class_ref = match normalized.as_str() {
            "base" | "any" | "provider" => ClassRef::Base,
            "infra" => ClassRef::Category(Category::Infra),
            "cloud" => ClassRef::Category(Category::Cloud),
            "vmware" | "virtualcenter" => ClassRef::Type(ProviderClass::VirtualCenter),
            "rhev" | "rhevm" | "rhv" => ClassRef::Type(ProviderClass::Rhevm),
            "openstack" => ClassRef::Type(ProviderClass::Openstack),
            "ec2" => ClassRef::Type(ProviderClass::Ec2),
            "azure" => ClassRef::Type(ProviderClass::Azure),
            "gce" => ClassRef::Type(ProviderClass::Gce),
            "scvmm" => ClassRef::Type(ProviderClass::Scvmm),
            "openstack_infra" | "openstack-infra" => {
                ClassRef::Type(ProviderClass::OpenstackInfra)
            }
            _ => return error::InvalidClassRefSnafu { value: s }.fail().map_err(Error::from),
        };
        Ok(class_ref)
    }
}

impl Display for ClassRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassRef::Base => write!(f, "base"),
            ClassRef::Category(category) => Display::fmt(category.as_str(), f),
            ClassRef::Type(class) => Display::fmt(class.type_name(), f),
        }
    }
}

impl Serialize for ClassRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClassRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn type_names_round_trip_through_serde_plain() {
        for class in ProviderClass::all() {
            let parsed: ProviderClass = class.type_name().parse().unwrap();
            assert_eq!(parsed, *class);
            assert_eq!(class.to_string(), class.type_name());
        }
    }

    #[test]
    fn subclass_relation() {
        let vc = ProviderClass::VirtualCenter;
        assert!(vc.is_a(&ClassRef::Base));
        assert!(vc.is_a(&ClassRef::Category(Category::Infra)));
        assert!(!vc.is_a(&ClassRef::Category(Category::Cloud)));
        assert!(vc.is_a(&ClassRef::Type(ProviderClass::VirtualCenter)));
        assert!(!vc.is_a(&ClassRef::Type(ProviderClass::Rhevm)));
    }

    #[test]
    fn class_ref_aliases() {
        assert_eq!(
            "VMware".parse::<ClassRef>().unwrap(),
            ClassRef::Type(ProviderClass::VirtualCenter)
        );
        assert_eq!(
            "rhev".parse::<ClassRef>().unwrap(),
            ClassRef::Type(ProviderClass::Rhevm)
        );
        assert_eq!(
            "cloud".parse::<ClassRef>().unwrap(),
            ClassRef::Category(Category::Cloud)
        );
        assert!("kubernetes".parse::<ClassRef>().is_err());
    }

    #[test]
    fn only_cloud_classes_have_regions() {
        for class in ProviderClass::all() {
            if class.capabilities().regions {
                assert_eq!(class.category(), Category::Cloud);
            }
        }
    }
}

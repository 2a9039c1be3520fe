use crate::error::{self, CollectionResult};
use crate::parametrize::{providers_by_class, Collector, Metafunc, Parametrization};
use provsys_model::constants::PROVIDER_FIXTURE_NAME;
use provsys_model::{ClassRef, RequiredField, Selector};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::fmt::{Debug, Formatter};

/// How long a parametrized fixture value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Function,
    Class,
    Module,
    Session,
}

serde_plain::derive_display_from_serialize!(Scope);

impl Default for Scope {
    fn default() -> Self {
        Scope::Function
    }
}

/// Produces the parametrization for a marker. The default is [`providers_by_class`].
pub type GenFunc = fn(&Collector, &dyn Metafunc, &ProviderMarker) -> Parametrization;

/// The provider marker attached to a test function, class or module. It says which providers the
/// test runs against and how the `provider` fixture is parametrized.
///
/// Markers are written in YAML:
///
/// ```yaml
/// classes: [vmware, rhevm]
/// selector: ONE_PER_TYPE
/// required_fields: [templates.small_template]
/// scope: module
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderMarker {
    pub classes: Vec<ClassRef>,
    pub required_fields: Vec<RequiredField>,
    pub required_flags: Vec<String>,
    pub selector: Selector,
    pub scope: Scope,
    pub indirect: bool,
    /// Drop the parametrized argnames the test does not take.
    pub filter_unused: bool,
    /// Replace every other marker for the same fixture.
    #[serde(rename = "override")]
    pub override_others: bool,
    pub fixture_name: String,
    #[serde(skip, default = "default_gen_func")]
    pub gen_func: GenFunc,
}

fn default_gen_func() -> GenFunc {
    providers_by_class
}

impl Default for ProviderMarker {
    fn default() -> Self {
        Self {
            classes: vec![ClassRef::Base],
            required_fields: Vec::new(),
            required_flags: Vec::new(),
            selector: Selector::All,
            scope: Scope::Function,
            indirect: false,
            filter_unused: true,
            override_others: false,
            fixture_name: PROVIDER_FIXTURE_NAME.to_string(),
            gen_func: default_gen_func(),
        }
    }
}

impl Debug for ProviderMarker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderMarker")
            .field("classes", &self.classes)
            .field("required_fields", &self.required_fields)
            .field("required_flags", &self.required_flags)
            .field("selector", &self.selector)
            .field("scope", &self.scope)
            .field("indirect", &self.indirect)
            .field("filter_unused", &self.filter_unused)
            .field("override_others", &self.override_others)
            .field("fixture_name", &self.fixture_name)
            .finish()
    }
}

impl ProviderMarker {
    pub fn new<I: IntoIterator<Item = ClassRef>>(classes: I) -> Self {
        Self {
            classes: classes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Parse a marker written on the test `function`.
    pub fn from_yaml(function: &str, yaml: &str) -> CollectionResult<Self> {
        serde_yaml::from_str(yaml).context(error::InvalidMarkerSnafu { function })
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn required_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<RequiredField>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn required_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn indirect(mut self) -> Self {
        self.indirect = true;
        self
    }

    pub fn keep_unused(mut self) -> Self {
        self.filter_unused = false;
        self
    }

    pub fn overriding(mut self) -> Self {
        self.override_others = true;
        self
    }

    pub fn fixture_name<S: Into<String>>(mut self, name: S) -> Self {
        self.fixture_name = name.into();
        self
    }

    pub fn gen_func(mut self, gen_func: GenFunc) -> Self {
        self.gen_func = gen_func;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use provsys_model::{Category, ProviderClass};

    #[test]
    fn markers_parse_from_yaml() {
        let marker = ProviderMarker::from_yaml(
            "test_provision",
            r#"
classes: [vmware, cloud]
selector: ONE_PER_TYPE
required_fields: [templates.small_template]
scope: module
override: true
"#,
        )
        .unwrap();
        assert_eq!(
            marker.classes,
            vec![
                ClassRef::Type(ProviderClass::VirtualCenter),
                ClassRef::Category(Category::Cloud)
            ]
        );
        assert_eq!(marker.selector, Selector::OnePerType);
        assert_eq!(marker.scope, Scope::Module);
        assert!(marker.override_others);
        assert!(marker.filter_unused);
        assert_eq!(marker.fixture_name, "provider");
        assert_eq!(
            marker.required_fields,
            vec![RequiredField::dotted("templates.small_template")]
        );
    }

    #[test]
    fn bad_markers_name_the_test() {
        let error = ProviderMarker::from_yaml("test_bad", "classes: [mainframe]").unwrap_err();
        assert!(error.to_string().contains("test_bad"));
    }
}

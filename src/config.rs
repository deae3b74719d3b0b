//! Callout configuration.
//!
//! The callout is configured through string properties. A property value is either a literal,
//! a whole-value `{variable}` reference, or a template embedding `{variable}` references. The
//! variables are looked up from the message context of the host.

use regex::{Captures, Regex};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::sync::OnceLock;

use crate::resolve::MessageTarget;

/// Name of the variable holding the descriptor set.
pub const PROP_DESCRIPTOR_REF: &str = "pb-descriptor-base64-ref";

/// Whether the descriptor set variable holds base64 text. Defaults to `true`.
pub const PROP_DESCRIPTOR_IS_BASE64: &str = "pb-descriptor-is-base64";

/// Name of the variable holding the request path.
pub const PROP_SERVICE_METHOD_REF: &str = "pb-service-method-ref";

/// `request` or `response`.
pub const PROP_MESSAGE_REF: &str = "pb-message-ref";

/// Whether the message body is base64 encoded.
pub const PROP_MESSAGE_IS_BASE64: &str = "pb-message-is-base64";

/// Name of an extra variable receiving the decoded message.
pub const PROP_DECODED_MESSAGE_REF: &str = "pb-decoded-message-ref";

/// Configuration error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError
{
    /// The properties are not valid TOML.
    #[snafu(display("invalid properties: {}", source))]
    Parse
    {
        source: toml::de::Error
    },

    /// A boolean property has some other value.
    #[snafu(display("property '{}' must be 'true' or 'false', got '{}'", property, value))]
    InvalidBool
    {
        property: String, value: String
    },

    /// The message property names neither the request nor the response.
    #[snafu(display(
        "property '{}' must be 'request' or 'response', got '{}'",
        PROP_MESSAGE_REF,
        value
    ))]
    InvalidTarget
    {
        value: String
    },
}

/// Source of flow variables.
pub trait Variables
{
    /// Gets a variable value.
    fn get_variable(&self, name: &str) -> Option<String>;
}

/// Flow variables that can be written.
pub trait VariablesMut: Variables
{
    /// Sets a variable value.
    fn set_variable(&mut self, name: &str, value: String);
}

impl<S: BuildHasher> Variables for HashMap<String, String, S>
{
    fn get_variable(&self, name: &str) -> Option<String>
    {
        self.get(name).cloned()
    }
}

impl<S: BuildHasher> VariablesMut for HashMap<String, String, S>
{
    fn set_variable(&mut self, name: &str, value: String)
    {
        self.insert(name.to_string(), value);
    }
}

impl Variables for BTreeMap<String, String>
{
    fn get_variable(&self, name: &str) -> Option<String>
    {
        self.get(name).cloned()
    }
}

impl VariablesMut for BTreeMap<String, String>
{
    fn set_variable(&mut self, name: &str, value: String)
    {
        self.insert(name.to_string(), value);
    }
}

/// Property value as written in the configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue
{
    /// String value, possibly with variable references.
    Text(String),

    /// Boolean value.
    Bool(bool),
}

impl From<&str> for PropertyValue
{
    fn from(s: &str) -> Self
    {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue
{
    fn from(s: String) -> Self
    {
        PropertyValue::Text(s)
    }
}

impl From<bool> for PropertyValue
{
    fn from(b: bool) -> Self
    {
        PropertyValue::Bool(b)
    }
}

/// Callout properties.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Properties
{
    values: BTreeMap<String, PropertyValue>,
}

impl Properties
{
    /// Empty properties.
    pub fn new() -> Self
    {
        Default::default()
    }

    /// Reads properties from a TOML table of strings and booleans.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError>
    {
        toml::from_str(text).context(Parse {})
    }

    /// Sets a property.
    pub fn insert(&mut self, name: &str, value: impl Into<PropertyValue>) -> &mut Self
    {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Gets a property as written.
    pub fn get(&self, name: &str) -> Option<&PropertyValue>
    {
        self.values.get(name)
    }
}

fn var_ref_pattern() -> &'static Regex
{
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[a-zA-Z0-9.\-]+\}").unwrap())
}

fn is_var_ref(text: &str) -> bool
{
    text.len() >= 2 && text.starts_with('{') && text.ends_with('}')
}

fn trim_braces(text: &str) -> &str
{
    &text[1..text.len() - 1]
}

/// Resolves property values and variable references.
pub struct VarResolver<'a, V: ?Sized>
{
    vars: &'a V,
    properties: &'a Properties,
}

impl<'a, V: Variables + ?Sized> VarResolver<'a, V>
{
    /// Resolver looking up variables from `vars`.
    pub fn new(vars: &'a V, properties: &'a Properties) -> Self
    {
        VarResolver { vars, properties }
    }

    /// Evaluates text that may be a whole-value `{variable}` reference.
    pub fn eval(&self, text: &str) -> Option<String>
    {
        match is_var_ref(text) {
            true => self.get_var(trim_braces(text)),
            false => Some(text.to_string()),
        }
    }

    /// Gets a variable. An empty name has no value.
    pub fn get_var(&self, name: &str) -> Option<String>
    {
        if name.is_empty() {
            return None;
        }
        self.vars.get_variable(name)
    }

    /// Gets a property value with its variable references resolved.
    pub fn get_prop(&self, name: &str) -> Option<String>
    {
        match self.properties.get(name)? {
            PropertyValue::Bool(b) => Some(b.to_string()),
            PropertyValue::Text(text) if is_var_ref(text) => self.get_var(trim_braces(text)),
            PropertyValue::Text(text) => Some(self.replace_all_refs(text)),
        }
    }

    /// Gets a boolean property. Missing and empty values give the default.
    pub fn get_bool_prop(&self, name: &str, default: bool) -> Result<bool, ConfigError>
    {
        match self.get_prop(name) {
            None => Ok(default),
            Some(value) if value.is_empty() => Ok(default),
            Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
            Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
            Some(value) => Err(ConfigError::InvalidBool {
                property: name.to_string(),
                value,
            }),
        }
    }

    /// Replaces every `{variable}` in the text. Unset variables are replaced with nothing.
    pub fn replace_all_refs(&self, text: &str) -> String
    {
        var_ref_pattern()
            .replace_all(text, |caps: &Captures| {
                self.get_var(trim_braces(&caps[0])).unwrap_or_default()
            })
            .into_owned()
    }
}

/// Resolved callout configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CalloutConfig
{
    /// Variable holding the descriptor set.
    pub descriptor_var: Option<String>,

    /// Whether the descriptor set is base64 text.
    pub descriptor_is_base64: bool,

    /// Variable holding the request path.
    pub service_method_var: Option<String>,

    /// Message to decode.
    pub target: MessageTarget,

    /// Whether the message body is base64 encoded.
    pub message_is_base64: bool,

    /// Extra variable receiving the decoded message.
    pub decoded_message_var: Option<String>,
}

impl CalloutConfig
{
    /// Resolves the properties against the variables.
    pub fn resolve<V: Variables + ?Sized>(
        properties: &Properties,
        vars: &V,
    ) -> Result<Self, ConfigError>
    {
        let resolver = VarResolver::new(vars, properties);
        let non_empty = |name| resolver.get_prop(name).filter(|v: &String| !v.is_empty());

        let target = match non_empty(PROP_MESSAGE_REF) {
            None => MessageTarget::Request,
            Some(v) if v.eq_ignore_ascii_case("request") => MessageTarget::Request,
            Some(v) if v.eq_ignore_ascii_case("response") => MessageTarget::Response,
            Some(value) => return Err(ConfigError::InvalidTarget { value }),
        };

        Ok(CalloutConfig {
            descriptor_var: non_empty(PROP_DESCRIPTOR_REF),
            descriptor_is_base64: resolver.get_bool_prop(PROP_DESCRIPTOR_IS_BASE64, true)?,
            service_method_var: non_empty(PROP_SERVICE_METHOD_REF),
            target,
            message_is_base64: resolver.get_bool_prop(PROP_MESSAGE_IS_BASE64, false)?,
            decoded_message_var: non_empty(PROP_DECODED_MESSAGE_REF),
        })
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    fn vars() -> HashMap<String, String>
    {
        let mut vars = HashMap::new();
        vars.insert("proxy.pathsuffix".to_string(), "/a.B/C".to_string());
        vars.insert("flag".to_string(), "TRUE".to_string());
        vars.insert("which".to_string(), "response".to_string());
        vars
    }

    #[test]
    fn whole_value_references()
    {
        let vars = vars();
        let mut props = Properties::new();
        props.insert("path", "{proxy.pathsuffix}");
        props.insert("missing", "{nope}");

        let resolver = VarResolver::new(&vars, &props);
        assert_eq!(resolver.get_prop("path").as_deref(), Some("/a.B/C"));
        assert_eq!(resolver.get_prop("missing"), None);
        assert_eq!(resolver.get_prop("unset"), None);
        assert_eq!(resolver.eval("{flag}").as_deref(), Some("TRUE"));
        assert_eq!(resolver.eval("literal").as_deref(), Some("literal"));
    }

    #[test]
    fn embedded_references()
    {
        let vars = vars();
        let mut props = Properties::new();
        props.insert("tmpl", "path={proxy.pathsuffix};x={nope}");

        let resolver = VarResolver::new(&vars, &props);
        assert_eq!(
            resolver.get_prop("tmpl").as_deref(),
            Some("path=/a.B/C;x=")
        );
    }

    #[test]
    fn booleans()
    {
        let vars = vars();
        let mut props = Properties::new();
        props.insert("a", "{flag}");
        props.insert("b", false);
        props.insert("c", "yes");

        let resolver = VarResolver::new(&vars, &props);
        assert!(resolver.get_bool_prop("a", false).unwrap());
        assert!(!resolver.get_bool_prop("b", true).unwrap());
        assert!(resolver.get_bool_prop("unset", true).unwrap());
        match resolver.get_bool_prop("c", false) {
            Err(ConfigError::InvalidBool { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn callout_config_from_toml()
    {
        let props = Properties::from_toml(
            r#"
            pb-descriptor-base64-ref = "descriptor"
            pb-service-method-ref = "proxy.pathsuffix"
            pb-message-ref = "{which}"
            pb-message-is-base64 = true
            pb-decoded-message-ref = "decoded"
            "#,
        )
        .unwrap();

        let config = CalloutConfig::resolve(&props, &vars()).unwrap();
        assert_eq!(config.descriptor_var.as_deref(), Some("descriptor"));
        assert!(config.descriptor_is_base64);
        assert_eq!(config.service_method_var.as_deref(), Some("proxy.pathsuffix"));
        assert_eq!(config.target, MessageTarget::Response);
        assert!(config.message_is_base64);
        assert_eq!(config.decoded_message_var.as_deref(), Some("decoded"));
    }

    #[test]
    fn invalid_target()
    {
        let mut props = Properties::new();
        props.insert(PROP_MESSAGE_REF, "body");
        match CalloutConfig::resolve(&props, &vars()) {
            Err(ConfigError::InvalidTarget { value }) => assert_eq!(value, "body"),
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}

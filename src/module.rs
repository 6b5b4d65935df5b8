//! Transformation modules and the registry that names them.
//!
//! A module is a small unit applied to each record of a source set in turn. It
//! has exactly one of three capabilities, and the capability decides when the
//! renderer may run it:
//!
//! | Capability | Runs on | Stage requirement |
//! |------------|---------|-------------------|
//! | [`Filter`] | path + content so far | any stage |
//! | [`Preprocessor`] | source text | read, never after render |
//! | [`Processor`] | rendered text | rendered (forced if needed) |
//!
//! Modules are looked up by snake-case name. The name is turned into a
//! registry key by capitalising each underscore-delimited segment
//! (`strip_front_matter` → `StripFrontMatter`), so `StripFrontMatter` and
//! `strip_front_matter` refer to the same module.

use crate::error::ModuleError;
use crate::source::SourceRecord;
use serde_json::Value;
use std::collections::HashMap;

pub trait Filter {
    /// Return `false` to drop the record from the set.
    fn filter(&self, record: &SourceRecord, args: &[Value]) -> bool;
}

pub trait Preprocessor {
    fn preprocess(&self, record: &mut SourceRecord, args: &[Value]) -> Result<(), ModuleError>;
}

pub trait Processor {
    fn process(&self, record: &mut SourceRecord, args: &[Value]) -> Result<(), ModuleError>;
}

/// A resolved module, tagged with its capability.
pub enum Module {
    Filter(Box<dyn Filter>),
    Preprocessor(Box<dyn Preprocessor>),
    Processor(Box<dyn Processor>),
}

impl Module {
    pub fn kind(&self) -> &'static str {
        match self {
            Module::Filter(_) => "filter",
            Module::Preprocessor(_) => "preprocessor",
            Module::Processor(_) => "processor",
        }
    }
}

type ModuleFactory = Box<dyn Fn() -> Module>;

/// Convert a snake-case module name into its registry key.
pub fn registry_key(name: &str) -> String {
    name.split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[derive(Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the modules shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("skip_underscored", || Module::Filter(Box::new(SkipUnderscored)));
        registry.register("replace", || Module::Preprocessor(Box::new(Replace)));
        registry.register("strip_front_matter", || {
            Module::Preprocessor(Box::new(StripFrontMatter))
        });
        registry.register("append", || Module::Processor(Box::new(Append)));
        registry
    }

    pub fn register(&mut self, name: &str, factory: impl Fn() -> Module + 'static) {
        self.factories.insert(registry_key(name), Box::new(factory));
    }

    pub fn resolve(&self, name: &str) -> Option<Module> {
        self.factories.get(&registry_key(name)).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&registry_key(name))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

fn string_arg<'a>(args: &'a [Value], index: usize, what: &str) -> Result<&'a str, ModuleError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ModuleError::new(format!("argument {} ({what}) must be a string", index + 1)))
}

/// Drops records whose file name starts with `_` (partials, drafts).
pub struct SkipUnderscored;

impl Filter for SkipUnderscored {
    fn filter(&self, record: &SourceRecord, _args: &[Value]) -> bool {
        !record
            .path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('_'))
            .unwrap_or(false)
    }
}

/// `replace(from, to)`: plain string replacement in the source text.
pub struct Replace;

impl Preprocessor for Replace {
    fn preprocess(&self, record: &mut SourceRecord, args: &[Value]) -> Result<(), ModuleError> {
        let from = string_arg(args, 0, "from")?;
        let to = string_arg(args, 1, "to")?;
        if from.is_empty() {
            return Err(ModuleError::new("'from' must not be empty"));
        }
        if let Some(content) = record.content.as_mut() {
            *content = content.replace(from, to);
        }
        Ok(())
    }
}

/// Removes a leading `---` delimited front matter block.
pub struct StripFrontMatter;

impl Preprocessor for StripFrontMatter {
    fn preprocess(&self, record: &mut SourceRecord, _args: &[Value]) -> Result<(), ModuleError> {
        if let Some(content) = record.content.as_mut() {
            if let Some(body) = split_front_matter(content) {
                *content = body.to_string();
            }
        }
        Ok(())
    }
}

/// Body after the front matter, or `None` if there is no closed block.
fn split_front_matter(text: &str) -> Option<&str> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() == "---" {
            return Some(&rest[offset..]);
        }
    }
    None
}

/// `append(text)`: appends text to the rendered output.
pub struct Append;

impl Processor for Append {
    fn process(&self, record: &mut SourceRecord, args: &[Value]) -> Result<(), ModuleError> {
        let text = string_arg(args, 0, "text")?;
        record.content.get_or_insert_with(String::new).push_str(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_key_capitalizes_segments() {
        assert_eq!(registry_key("strip_front_matter"), "StripFrontMatter");
        assert_eq!(registry_key("replace"), "Replace");
        assert_eq!(registry_key("StripFrontMatter"), "StripFrontMatter");
        assert_eq!(registry_key("a__b"), "AB");
        assert_eq!(registry_key(""), "");
    }

    #[test]
    fn resolve_uses_registry_key() {
        let registry = ModuleRegistry::with_builtins();
        assert!(matches!(
            registry.resolve("strip_front_matter"),
            Some(Module::Preprocessor(_))
        ));
        assert!(matches!(
            registry.resolve("SkipUnderscored"),
            Some(Module::Filter(_))
        ));
        assert!(registry.resolve("does_not_exist").is_none());
    }

    #[test]
    fn builtin_keys_are_listed_sorted() {
        let registry = ModuleRegistry::with_builtins();
        assert_eq!(
            registry.keys(),
            vec!["Append", "Replace", "SkipUnderscored", "StripFrontMatter"]
        );
    }

    #[test]
    fn skip_underscored_drops_partials() {
        let args = [];
        assert!(!SkipUnderscored.filter(&SourceRecord::new("docs/_partial.md"), &args));
        assert!(SkipUnderscored.filter(&SourceRecord::new("docs/page.md"), &args));
    }

    #[test]
    fn replace_rewrites_content() {
        let mut record = SourceRecord::with_content("a.md", "teh cat and teh dog");
        Replace
            .preprocess(&mut record, &[Value::from("teh"), Value::from("the")])
            .unwrap();
        assert_eq!(record.text(), "the cat and the dog");
    }

    #[test]
    fn replace_requires_string_args() {
        let mut record = SourceRecord::with_content("a.md", "x");
        let err = Replace.preprocess(&mut record, &[Value::from(1)]).unwrap_err();
        assert!(err.0.contains("argument 1"));
        assert_eq!(record.text(), "x");
    }

    #[test]
    fn strip_front_matter_removes_block() {
        let mut record =
            SourceRecord::with_content("a.md", "---\ntitle: Hi\n---\n# Body\n");
        StripFrontMatter.preprocess(&mut record, &[]).unwrap();
        assert_eq!(record.text(), "# Body\n");
    }

    #[test]
    fn strip_front_matter_leaves_unclosed_block() {
        let mut record = SourceRecord::with_content("a.md", "---\ntitle: Hi\n# Body\n");
        StripFrontMatter.preprocess(&mut record, &[]).unwrap();
        assert_eq!(record.text(), "---\ntitle: Hi\n# Body\n");
    }

    #[test]
    fn append_adds_text() {
        let mut record = SourceRecord::with_content("a.md", "<p>A</p>");
        Append
            .process(&mut record, &[Value::from("<hr>")])
            .unwrap();
        assert_eq!(record.text(), "<p>A</p><hr>");
    }
}

#![forbid(unsafe_code)]

//! Host document and window traits.

use std::fmt;
use std::rc::Rc;

use crate::element::Element;
use crate::error::Result;
use crate::event::EventTarget;

/// Element lookup understood by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// `#id`
    ById(String),
    /// `tag[attr="value"]`
    TagAttr {
        tag: String,
        attr: String,
        value: String,
    },
}

impl Query {
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::ById(id.into())
    }

    #[must_use]
    pub fn tag_attr(tag: impl Into<String>, attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::TagAttr {
            tag: tag.into(),
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// Whether `element` satisfies this query.
    #[must_use]
    pub fn matches(&self, element: &Element) -> bool {
        match self {
            Self::ById(id) => element.attribute("id").as_deref() == Some(id.as_str()),
            Self::TagAttr { tag, attr, value } => {
                element.tag_name().eq_ignore_ascii_case(tag)
                    && element.attribute(attr).as_deref() == Some(value.as_str())
            }
        }
    }

    /// CSS selector text for backends that speak `querySelector`.
    #[must_use]
    pub fn to_selector(&self) -> String {
        match self {
            Self::ById(id) => format!("[id=\"{}\"]", escape_attr_value(id)),
            Self::TagAttr { tag, attr, value } => {
                format!("{tag}[{attr}=\"{}\"]", escape_attr_value(value))
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_selector())
    }
}

fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(ch),
        }
    }
    out
}

/// Document operations the composables rely on.
pub trait HostDocument {
    fn create_element(&self, tag: &str) -> Result<Element>;

    /// Every connected element matching `query`, in document order.
    fn query_all(&self, query: &Query) -> Vec<Element>;

    /// First connected element matching `query`.
    fn query(&self, query: &Query) -> Option<Element> {
        self.query_all(query).into_iter().next()
    }

    fn element_by_id(&self, id: &str) -> Option<Element> {
        self.query(&Query::by_id(id))
    }

    /// Append to `<head>`, moving the element if it already has a parent.
    /// Returns the appended element.
    fn append_to_head(&self, element: &Element) -> Result<Element>;

    /// Detach `element` from `<head>`. Elements elsewhere are left alone.
    fn remove_from_head(&self, element: &Element);

    /// The focused element, if any.
    fn active_element(&self) -> Option<Element>;
}

/// Window-level operations.
pub trait HostWindow: EventTarget {
    fn document(&self) -> Option<DocumentRef>;

    /// Run `task` after the current dispatch completes (a zero-delay timer).
    fn queue_task(&self, task: Box<dyn FnOnce()>);
}

pub type DocumentRef = Rc<dyn HostDocument>;
pub type WindowRef = Rc<dyn HostWindow>;

/// The ambient browser document, or `None` outside a browser.
#[must_use]
pub fn default_document() -> Option<DocumentRef> {
    #[cfg(target_arch = "wasm32")]
    {
        crate::web::document()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        None
    }
}

/// The ambient browser window, or `None` outside a browser.
#[must_use]
pub fn default_window() -> Option<WindowRef> {
    #[cfg(target_arch = "wasm32")]
    {
        crate::web::window()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn selector_rendering() {
        assert_eq!(
            Query::tag_attr("script", "src", "https://cdn.example/a.js").to_selector(),
            r#"script[src="https://cdn.example/a.js"]"#
        );
        assert_eq!(Query::by_id("theme").to_selector(), r#"[id="theme"]"#);
    }

    #[test]
    fn selector_escapes_quotes() {
        assert_eq!(
            Query::tag_attr("script", "src", r#"a"b\c"#).to_string(),
            r#"script[src="a\"b\\c"]"#
        );
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn no_ambient_host_natively() {
        assert!(default_document().is_none());
        assert!(default_window().is_none());
    }
}

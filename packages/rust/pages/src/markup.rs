//! Abstract view over the external parser's markup tree.
//!
//! The reconstructor only needs tag names, text, ids, and ordered children,
//! so any tree can be plugged in. [`scraper::ElementRef`] is supported out of
//! the box.

use scraper::{ElementRef, Node};

/// One child of an element, in document order.
#[derive(Debug, Clone)]
pub enum MarkupChild<N> {
    Text(String),
    Element(N),
}

/// One element of a document-order markup tree.
pub trait MarkupNode: Sized {
    /// Lower-case tag name (`p`, `table`, `footer`, ...).
    fn tag_name(&self) -> &str;

    /// Descendant text fragments in document order, untrimmed.
    fn text_segments(&self) -> Vec<String>;

    /// The `id` attribute, if any.
    fn id(&self) -> Option<&str>;

    /// Child elements in document order (text nodes excluded).
    fn children(&self) -> Vec<Self>;

    /// Text and element children interleaved in document order.
    fn child_items(&self) -> Vec<MarkupChild<Self>>;

    /// Serialized markup of this node, when the backend can produce it.
    fn outer_markup(&self) -> Option<String> {
        None
    }
}

impl<'a> MarkupNode for ElementRef<'a> {
    fn tag_name(&self) -> &str {
        self.value().name()
    }

    fn text_segments(&self) -> Vec<String> {
        self.text().map(str::to_string).collect()
    }

    fn id(&self) -> Option<&str> {
        self.value().attr("id")
    }

    fn children(&self) -> Vec<Self> {
        (**self).children().filter_map(ElementRef::wrap).collect()
    }

    fn child_items(&self) -> Vec<MarkupChild<Self>> {
        (**self)
            .children()
            .filter_map(|child| match child.value() {
                Node::Text(text) => Some(MarkupChild::Text(text.to_string())),
                Node::Element(_) => ElementRef::wrap(child).map(MarkupChild::Element),
                _ => None,
            })
            .collect()
    }

    fn outer_markup(&self) -> Option<String> {
        Some(self.html())
    }
}

//! Node-against-filter tests for selecting insertion points.

use crate::{error::SelectorError, tree::Element};

/// Decides whether an element satisfies an insertion point's `select` filter.
///
/// Errors are swallowed by distribution and count as "no match".
pub trait SelectorMatcher {
	fn matches(&self, element: &Element, selector: &str) -> Result<bool, SelectorError>;
}
impl<F> SelectorMatcher for F
where
	F: Fn(&Element, &str) -> Result<bool, SelectorError>,
{
	fn matches(&self, element: &Element, selector: &str) -> Result<bool, SelectorError> {
		self(element, selector)
	}
}

/// Comma-separated lists of compound selectors: `tag`, `*`, `.class`, `#id`, `[attr]` and `[attr=value]`.
///
/// Combinators and pseudo-classes are rejected, since only the element itself may be inspected.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleSelectors;
impl SelectorMatcher for SimpleSelectors {
	fn matches(&self, element: &Element, selector: &str) -> Result<bool, SelectorError> {
		let mut any = false;
		for compound in selector.split(',') {
			// Parse every alternative so that a later syntax error still fails the whole list.
			any |= Compound::parse(compound.trim(), selector)?.matches(element);
		}
		Ok(any)
	}
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Compound<'a> {
	tag: Option<&'a str>,
	ids: Vec<&'a str>,
	classes: Vec<&'a str>,
	attributes: Vec<(&'a str, Option<&'a str>)>,
}
impl<'a> Compound<'a> {
	fn parse(compound: &'a str, selector: &str) -> Result<Self, SelectorError> {
		if compound.is_empty() {
			return Err(SelectorError::Empty(selector.to_owned()));
		}

		let unsupported = |at: usize| SelectorError::Unsupported {
			selector: selector.to_owned(),
			found: compound[at..].chars().next().unwrap_or(' '),
			at,
		};

		let mut parsed = Compound::default();
		let mut rest = compound;
		let offset = |rest: &str| compound.len() - rest.len();

		if let Some(stripped) = rest.strip_prefix('*') {
			rest = stripped;
		} else {
			let (tag, tail) = split_ident(rest);
			if !tag.is_empty() {
				parsed.tag = Some(tag);
			}
			rest = tail;
		}

		while let Some(c) = rest.chars().next() {
			match c {
				'.' | '#' => {
					let (ident, tail) = split_ident(&rest[1..]);
					if ident.is_empty() {
						return Err(unsupported(offset(rest)));
					}
					if c == '.' {
						parsed.classes.push(ident);
					} else {
						parsed.ids.push(ident);
					}
					rest = tail;
				}
				'[' => {
					let close = rest.find(']').ok_or_else(|| SelectorError::UnterminatedAttribute(selector.to_owned()))?;
					let inner = &rest[1..close];
					let (name, value) = match inner.find('=') {
						Some(eq) => (inner[..eq].trim(), Some(unquote(inner[eq + 1..].trim()))),
						None => (inner.trim(), None),
					};
					if name.is_empty() || !split_ident(name).1.is_empty() {
						return Err(unsupported(offset(rest)));
					}
					parsed.attributes.push((name, value));
					rest = &rest[close + 1..];
				}
				_ => return Err(unsupported(offset(rest))),
			}
		}

		Ok(parsed)
	}

	fn matches(&self, element: &Element) -> bool {
		self.tag.map_or(true, |tag| tag.eq_ignore_ascii_case(&element.tag))
			&& self.ids.iter().all(|&id| element.attribute("id") == Some(id))
			&& self.classes.iter().all(|&class| element.classes().any(|c| c == class))
			&& self.attributes.iter().all(|&(name, value)| match (element.attribute(name), value) {
				(Some(actual), Some(expected)) => actual == expected,
				(Some(_), None) => true,
				(None, _) => false,
			})
	}
}

fn split_ident(s: &str) -> (&str, &str) {
	let end = s.find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_')).unwrap_or_else(|| s.len());
	s.split_at(end)
}

fn unquote(value: &str) -> &str {
	for quote in &['"', '\''] {
		if let Some(inner) = value.strip_prefix(*quote).and_then(|v| v.strip_suffix(*quote)) {
			return inner;
		}
	}
	value
}

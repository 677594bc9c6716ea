//! SOAP 1.1 envelopes for the SAPControl web service.
//!
//! Requests are small enough to be written out directly. Responses are read
//! into a namespace-free element tree first, then mapped onto the typed
//! structs in `soap_types`.

use super::sap_error::SapError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SAPCONTROL_NS: &str = "urn:SAPControl";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Local name, namespace prefix stripped.
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of a direct child, empty when the child is missing.
    pub fn child_text(&self, name: &str) -> &str {
        self.child(name).map(|c| c.text.as_str()).unwrap_or("")
    }

    /// `<list><item>..</item>..</list>` style arrays.
    pub fn items<'a>(&'a self, list: &str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.child(list)
            .into_iter()
            .flat_map(|l| l.children.iter().filter(|c| c.name == "item"))
    }

    /// Depth-first search, self included.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

pub fn build_request(operation: &str, params: &[(&str, String)]) -> String {
    let mut body = String::new();
    for (name, value) in params {
        body.push_str(&format!("<{0}>{1}</{0}>", name, escape_text(value)));
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{env}" xmlns:SAPControl="{ns}">"#,
            r#"<SOAP-ENV:Body><SAPControl:{op}>{body}</SAPControl:{op}></SOAP-ENV:Body>"#,
            r#"</SOAP-ENV:Envelope>"#
        ),
        env = SOAP_ENV_NS,
        ns = SAPCONTROL_NS,
        op = operation,
        body = body
    )
}

fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn parse_document(xml: &str) -> Result<XmlElement, SapError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(XmlElement::new(local_name(&e)?)),
            Event::Empty(e) => {
                let el = XmlElement::new(local_name(&e)?);
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| SapError::Parse("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, el);
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    let raw = c.into_inner();
                    let text = std::str::from_utf8(&raw)
                        .map_err(|e| SapError::Parse(format!("CDATA is not UTF-8: {}", e)))?;
                    current.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SapError::Parse(format!(
            "document ended inside <{}>",
            stack.last().map(|e| e.name.as_str()).unwrap_or("")
        )));
    }
    root.ok_or_else(|| SapError::Parse("empty document".to_string()))
}

fn local_name(e: &BytesStart) -> Result<String, SapError> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_string)
        .map_err(|err| SapError::Parse(format!("element name is not UTF-8: {}", err)))
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => *root = Some(el),
    }
}

/// Returns the operation's response element, or the SOAP fault carried in the body.
pub fn extract_response<'a>(
    document: &'a XmlElement,
    operation: &str,
) -> Result<&'a XmlElement, SapError> {
    let body = document
        .find("Body")
        .ok_or_else(|| SapError::Parse(format!("{}: no SOAP body", operation)))?;
    let response = body
        .children
        .first()
        .ok_or_else(|| SapError::Parse(format!("{}: empty SOAP body", operation)))?;

    if response.name == "Fault" {
        let message = match response.child_text("faultstring") {
            "" => response
                .find("message")
                .map(|m| m.text.clone())
                .unwrap_or_default(),
            text => text.to_string(),
        };
        return Err(SapError::SoapFault {
            code: response.child_text("faultcode").to_string(),
            message,
        });
    }
    if response.name != format!("{}Response", operation) {
        log::debug!(
            "{}: unexpected response element <{}>",
            operation,
            response.name
        );
    }
    Ok(response)
}

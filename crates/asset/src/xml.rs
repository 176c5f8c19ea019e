//! Service XML dialect
//!
//! The asset store speaks request-response XML. Requests wrap a verb's
//! arguments in a `service.execute` envelope carrying the session token;
//! logon requests omit the envelope and carry credentials directly.
//!
//! Arguments are written in a shorthand that serializes to canonical XML:
//!
//! ```text
//! :name value                  -> <name>value</name>
//! :name -attr val text         -> <name attr="val">text</name>
//! :parent < :child v >         -> <parent><child>v</child></parent>
//! ```
//!
//! `:` at the top level separates root elements. User-supplied text is
//! escaped for `& < > "` before embedding.

use ps_core::{Error, Result};

/// One XML element: name, attributes, text, children
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Element name
    pub name: String,
    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
    /// Concatenated text content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Element with a name and no content
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Element with text content
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First descendant matching a `/`-separated element path
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        let mut current = self;
        for seg in path.split('/') {
            current = current.children.iter().find(|c| c.name == seg)?;
        }
        Some(current)
    }

    /// All direct children with the given name
    pub fn children_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a XmlElement> {
        let name = name.to_string();
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first descendant at `path`, if any
    pub fn value_of(&self, path: &str) -> Option<&str> {
        self.find(path).map(|e| e.text.as_str())
    }

    /// Serialize to canonical XML, escaping text and attribute values
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape_text(v));
            out.push('"');
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape_text(&self.text));
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Escape `& < > "` for embedding in element text or attribute values
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let (entity, len) = if rest.starts_with("&amp;") {
            ('&', 5)
        } else if rest.starts_with("&lt;") {
            ('<', 4)
        } else if rest.starts_with("&gt;") {
            ('>', 4)
        } else if rest.starts_with("&quot;") {
            ('"', 6)
        } else if rest.starts_with("&apos;") {
            ('\'', 6)
        } else {
            ('&', 1)
        };
        out.push(entity);
        rest = &rest[len..];
    }
    out.push_str(rest);
    out
}

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

/// Split shorthand input into whitespace-delimited tokens, honoring double
/// quotes
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => {
                if in_quotes {
                    in_quotes = false;
                } else {
                    in_quotes = true;
                    quoted = true;
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                    quoted = false;
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(Error::Protocol("unterminated quote in shorthand".into()));
    }
    if !current.is_empty() || quoted {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    Ok(tokens)
}

/// Parse shorthand argument syntax into elements.
///
/// Returns the root elements in input order; nesting with `< … >` attaches
/// children to the most recent element.
pub fn parse_shorthand(input: &str) -> Result<Vec<XmlElement>> {
    let tokens = tokenize(input)?;
    let mut roots: Vec<XmlElement> = Vec::new();
    // Stack of open parents; the cursor path into `roots`
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut i = 0;

    fn close_into(stack: &mut Vec<XmlElement>, roots: &mut Vec<XmlElement>) -> Result<()> {
        let done = stack
            .pop()
            .ok_or_else(|| Error::Protocol("unbalanced '>' in shorthand".into()))?;
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
        Ok(())
    }

    while i < tokens.len() {
        let tok = &tokens[i];
        if !tok.quoted && tok.text == "<" {
            // children of the most recently completed element at this level
            let owner = match stack.last_mut() {
                Some(parent) => parent.children.pop(),
                None => roots.pop(),
            };
            let owner =
                owner.ok_or_else(|| Error::Protocol("'<' without a preceding element".into()))?;
            stack.push(owner);
            i += 1;
        } else if !tok.quoted && tok.text == ">" {
            close_into(&mut stack, &mut roots)?;
            i += 1;
        } else if !tok.quoted && tok.text.starts_with(':') && tok.text.len() > 1 {
            let mut element = XmlElement::new(&tok.text[1..]);
            i += 1;
            // attributes: -name value pairs immediately after the element name
            while i + 1 < tokens.len()
                && !tokens[i].quoted
                && tokens[i].text.starts_with('-')
                && tokens[i].text.len() > 1
            {
                let key = tokens[i].text[1..].to_string();
                let value = tokens[i + 1].text.clone();
                element.attrs.push((key, value));
                i += 2;
            }
            // text: tokens up to the next structural token, space-joined
            let mut text_parts: Vec<String> = Vec::new();
            while i < tokens.len() {
                let t = &tokens[i];
                if !t.quoted
                    && (t.text == "<"
                        || t.text == ">"
                        || (t.text.starts_with(':') && t.text.len() > 1))
                {
                    break;
                }
                text_parts.push(t.text.clone());
                i += 1;
            }
            element.text = text_parts.join(" ");
            match stack.last_mut() {
                Some(parent) => parent.children.push(element),
                None => roots.push(element),
            }
        } else {
            return Err(Error::Protocol(format!(
                "unexpected shorthand token '{}'",
                tok.text
            )));
        }
    }

    if !stack.is_empty() {
        return Err(Error::Protocol("unbalanced '<' in shorthand".into()));
    }
    Ok(roots)
}

/// Build a `service.execute` request document for a verb and its arguments
pub fn execute_request(session: &str, verb: &str, args: &[XmlElement]) -> String {
    let mut inner = XmlElement::new("service");
    inner.attrs.push(("name".into(), verb.into()));
    inner.children = args.to_vec();

    let mut args_el = XmlElement::new("args");
    args_el.children.push(inner);

    let mut outer = XmlElement::new("service");
    outer.attrs.push(("name".into(), "service.execute".into()));
    outer.attrs.push(("session".into(), session.into()));
    outer.children.push(args_el);

    let mut request = XmlElement::new("request");
    request.children.push(outer);
    request.to_xml()
}

/// Build a logon request; credentials ride outside the execute envelope
pub fn logon_request(domain: &str, user: &str, password: &str) -> String {
    let mut args = XmlElement::new("args");
    args.children.push(XmlElement::with_text("domain", domain));
    args.children.push(XmlElement::with_text("user", user));
    args.children
        .push(XmlElement::with_text("password", password));

    let mut service = XmlElement::new("service");
    service.attrs.push(("name".into(), "system.logon".into()));
    service.children.push(args);

    let mut request = XmlElement::new("request");
    request.children.push(service);
    request.to_xml()
}

/// Build a token-based logon request
pub fn token_logon_request(token: &str) -> String {
    let mut args = XmlElement::new("args");
    args.children.push(XmlElement::with_text("token", token));

    let mut service = XmlElement::new("service");
    service.attrs.push(("name".into(), "system.logon".into()));
    service.children.push(args);

    let mut request = XmlElement::new("request");
    request.children.push(service);
    request.to_xml()
}

/// Parse an XML document into an element tree.
///
/// Handles declarations, comments, attributes, self-closing tags, and the
/// five standard entities; enough for the service's response envelope.
pub fn parse(input: &str) -> Result<XmlElement> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    parser.skip_misc();
    let root = parser.element()?;
    Ok(root)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Skip whitespace, XML declarations, and comments before an element
    fn skip_misc(&mut self) {
        loop {
            self.skip_ws();
            if self.starts_with("<?") {
                if let Some(end) = self.find("?>") {
                    self.pos = end + 2;
                    continue;
                }
            }
            if self.starts_with("<!--") {
                if let Some(end) = self.find("-->") {
                    self.pos = end + 3;
                    continue;
                }
            }
            break;
        }
    }

    fn find(&self, needle: &str) -> Option<usize> {
        let hay = &self.bytes[self.pos..];
        hay.windows(needle.len())
            .position(|w| w == needle.as_bytes())
            .map(|p| self.pos + p)
    }

    fn name(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if !b.is_ascii_whitespace() && b != b'>' && b != b'/' && b != b'=')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::Protocol("expected XML name".into()));
        }
        String::from_utf8(self.bytes[start..self.pos].to_vec())
            .map_err(|_| Error::Protocol("non-UTF-8 XML name".into()))
    }

    fn element(&mut self) -> Result<XmlElement> {
        if self.peek() != Some(b'<') {
            return Err(Error::Protocol("expected '<'".into()));
        }
        self.pos += 1;
        let mut element = XmlElement::new(self.name()?);

        // attributes
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(Error::Protocol("malformed self-closing tag".into()));
                    }
                    self.pos += 1;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let key = self.name()?;
                    self.skip_ws();
                    if self.peek() != Some(b'=') {
                        return Err(Error::Protocol(format!("attribute '{key}' missing value")));
                    }
                    self.pos += 1;
                    self.skip_ws();
                    let quote = self.peek();
                    if quote != Some(b'"') && quote != Some(b'\'') {
                        return Err(Error::Protocol("unquoted attribute value".into()));
                    }
                    let quote = quote.unwrap_or(b'"');
                    self.pos += 1;
                    let start = self.pos;
                    while matches!(self.peek(), Some(b) if b != quote) {
                        self.pos += 1;
                    }
                    let raw = String::from_utf8(self.bytes[start..self.pos].to_vec())
                        .map_err(|_| Error::Protocol("non-UTF-8 attribute".into()))?;
                    self.pos += 1;
                    element.attrs.push((key, unescape_text(&raw)));
                }
                None => return Err(Error::Protocol("unexpected end of XML".into())),
            }
        }

        // content
        let mut text = String::new();
        loop {
            match self.peek() {
                Some(b'<') => {
                    if self.starts_with("</") {
                        self.pos += 2;
                        let close = self.name()?;
                        if close != element.name {
                            return Err(Error::Protocol(format!(
                                "mismatched close tag: expected </{}>, got </{close}>",
                                element.name
                            )));
                        }
                        self.skip_ws();
                        if self.peek() != Some(b'>') {
                            return Err(Error::Protocol("malformed close tag".into()));
                        }
                        self.pos += 1;
                        element.text = unescape_text(text.trim());
                        return Ok(element);
                    }
                    if self.starts_with("<!--") {
                        match self.find("-->") {
                            Some(end) => self.pos = end + 3,
                            None => return Err(Error::Protocol("unterminated comment".into())),
                        }
                        continue;
                    }
                    element.children.push(self.element()?);
                }
                Some(_) => {
                    let start = self.pos;
                    while matches!(self.peek(), Some(b) if b != b'<') {
                        self.pos += 1;
                    }
                    text.push_str(
                        std::str::from_utf8(&self.bytes[start..self.pos])
                            .map_err(|_| Error::Protocol("non-UTF-8 text".into()))?,
                    );
                }
                None => {
                    return Err(Error::Protocol(format!(
                        "unterminated element <{}>",
                        element.name
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "sess-0123456789abcdef";

    #[test]
    fn test_execute_request_simple_args() {
        let args = parse_shorthand(":id 123 :format extended").unwrap();
        let xml = execute_request(SESSION, "asset.get", &args);
        assert_eq!(
            xml,
            format!(
                "<request><service name=\"service.execute\" session=\"{SESSION}\">\
                 <args><service name=\"asset.get\"><id>123</id><format>extended</format>\
                 </service></args></service></request>"
            )
        );
    }

    #[test]
    fn test_execute_request_quoted_value() {
        let args =
            parse_shorthand(":where \"namespace='/www' and name='system-alert'\" :action get-name")
                .unwrap();
        let xml = execute_request(SESSION, "asset.query", &args);
        assert!(xml.contains(
            "<where>namespace='/www' and name='system-alert'</where><action>get-name</action>"
        ));
        assert!(xml.starts_with("<request><service name=\"service.execute\""));
    }

    #[test]
    fn test_text_escaping() {
        let args = parse_shorthand(":note \"a < b & c\"").unwrap();
        let xml = execute_request(SESSION, "asset.set", &args);
        assert!(xml.contains("<note>a &lt; b &amp; c</note>"));
    }

    #[test]
    fn test_shorthand_attributes() {
        let args = parse_shorthand(":name -lang en hello world").unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].attr("lang"), Some("en"));
        assert_eq!(args[0].text, "hello world");
        assert_eq!(args[0].to_xml(), "<name lang=\"en\">hello world</name>");
    }

    #[test]
    fn test_shorthand_nesting() {
        let args = parse_shorthand(":meta < :field alpha :field beta > :top v").unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "meta");
        assert_eq!(args[0].children.len(), 2);
        assert_eq!(args[0].children[1].text, "beta");
        assert_eq!(args[1].name, "top");
    }

    #[test]
    fn test_shorthand_top_level_separation() {
        let args = parse_shorthand(":a 1 :b 2 :c 3").unwrap();
        let names: Vec<_> = args.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_shorthand_unbalanced() {
        assert!(parse_shorthand(":a < :b 1").is_err());
        assert!(parse_shorthand(":a 1 >").is_err());
        assert!(parse_shorthand("< :a 1 >").is_err());
    }

    #[test]
    fn test_logon_request_omits_execute_envelope() {
        let xml = logon_request("corp", "alice", "s3cret");
        assert_eq!(
            xml,
            "<request><service name=\"system.logon\"><args><domain>corp</domain>\
             <user>alice</user><password>s3cret</password></args></service></request>"
        );
        assert!(!xml.contains("service.execute"));
    }

    #[test]
    fn test_parse_response_roundtrip() {
        let doc = parse(
            "<response><reply><result><asset id=\"42\" version=\"3\">\
             <name>photo.jpg</name><size>1024</size></asset></result></reply></response>",
        )
        .unwrap();
        let asset = doc.find("reply/result/asset").unwrap();
        assert_eq!(asset.attr("id"), Some("42"));
        assert_eq!(asset.value_of("name"), Some("photo.jpg"));
        assert_eq!(asset.value_of("size"), Some("1024"));
    }

    #[test]
    fn test_parse_error_reply() {
        let doc = parse(
            "<response><reply><error/><message>session is not valid</message></reply></response>",
        )
        .unwrap();
        assert!(doc.find("reply/error").is_some());
        assert_eq!(doc.value_of("reply/message"), Some("session is not valid"));
    }

    #[test]
    fn test_parse_entities_and_declaration() {
        let doc = parse(
            "<?xml version=\"1.0\"?><root note=\"a&amp;b\">x &lt; y &amp; z</root>",
        )
        .unwrap();
        assert_eq!(doc.attr("note"), Some("a&b"));
        assert_eq!(doc.text, "x < y & z");
    }

    #[test]
    fn test_parse_rejects_mismatched_tags() {
        assert!(parse("<a><b></a></b>").is_err());
        assert!(parse("<a>").is_err());
    }

    #[test]
    fn test_serialize_parse_agreement() {
        let args = parse_shorthand(":meta < :field -k v \"x & y\" > :plain 7").unwrap();
        let mut wrapper = XmlElement::new("args");
        wrapper.children = args;
        let parsed = parse(&wrapper.to_xml()).unwrap();
        assert_eq!(parsed.find("meta/field").unwrap().attr("k"), Some("v"));
        assert_eq!(parsed.value_of("meta/field"), Some("x & y"));
        assert_eq!(parsed.value_of("plain"), Some("7"));
    }
}

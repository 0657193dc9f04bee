//! Lightweight parsing of the annotated function.
//!
//! The body is kept as raw tokens: the macros never look inside it, and a
//! body that does not parse as Rust must still expand to something close to
//! the input so that IDE tooling keeps working.
use proc_macro2::{Span, TokenStream, TokenTree};
use quote::{ToTokens, TokenStreamExt};
use syn::parse::{Parse, ParseStream};
use syn::token::Brace;
use syn::{AttrStyle, Attribute, Lit, Path, Signature, Token, Visibility, braced};

/// Reads a `bool` knob value.
pub(crate) fn lit_bool(lit: &Lit, knob: &str) -> syn::Result<bool> {
    match lit {
        Lit::Bool(b) => Ok(b.value),
        other => Err(syn::Error::new(
            other.span(),
            format!("`{knob}` expects a bool, e.g. `{knob} = true`."),
        )),
    }
}

/// Reads a non-zero `usize` knob value.
pub(crate) fn lit_count(lit: &Lit, knob: &str) -> syn::Result<usize> {
    let Lit::Int(int) = lit else {
        return Err(syn::Error::new(
            lit.span(),
            format!("`{knob}` expects an integer, e.g. `{knob} = 2`."),
        ));
    };

    match int.base10_parse::<usize>()? {
        0 => Err(syn::Error::new(int.span(), format!("`{knob}` may not be 0."))),
        n => Ok(n),
    }
}

/// Whether `path` names the built-in `#[test]` attribute.
pub(crate) fn is_builtin_test(path: &Path) -> bool {
    let segments: Vec<String> = path
        .segments
        .iter()
        .filter(|segment| segment.arguments.is_none())
        .map(|segment| segment.ident.to_string())
        .collect();

    if segments.len() != path.segments.len() {
        return false;
    }

    match segments.as_slice() {
        [test] => path.leading_colon.is_none() && test == "test",
        [krate, prelude, _edition, test] => {
            (krate == "core" || krate == "std") && prelude == "prelude" && test == "test"
        }
        _ => false,
    }
}

/// Appends `error` to `tokens`, keeping whatever was already expanded.
pub(crate) fn with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(error.into_compile_error());
    tokens
}

/// An `async fn` item with its body left unparsed.
pub(crate) struct EntryFn {
    pub(crate) attrs: Vec<Attribute>,
    pub(crate) vis: Visibility,
    pub(crate) sig: Signature,
    brace: Brace,
    /// `#![...]` found at the top of the body.
    inner_attrs: Vec<Attribute>,
    body: TokenStream,
}

impl EntryFn {
    /// Outer and inner attributes.
    pub(crate) fn all_attrs(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter().chain(&self.inner_attrs)
    }

    /// The body as a block expression, braces included.
    pub(crate) fn block(&self) -> TokenStream {
        let mut tokens = TokenStream::new();
        self.brace
            .surround(&mut tokens, |tokens| tokens.extend(self.body.clone()));
        tokens
    }

    /// Spans of the first and last token of the final statement. Type errors
    /// on the output point there, so the generated `block_on` borrows them.
    pub(crate) fn tail_spans(&self) -> (Span, Span) {
        let mut last_stmt: Vec<TokenTree> = Vec::new();
        let mut current: Vec<TokenTree> = Vec::new();

        for tt in self.body.clone() {
            let ends_stmt = matches!(&tt, TokenTree::Punct(p) if p.as_char() == ';');
            current.push(tt);

            if ends_stmt {
                last_stmt = std::mem::take(&mut current);
            }
        }

        // Trailing expression without a `;`.
        if !current.is_empty() {
            last_stmt = current;
        }

        let start = last_stmt
            .first()
            .map_or_else(Span::call_site, TokenTree::span);
        let end = last_stmt.last().map_or(start, TokenTree::span);
        (start, end)
    }

    /// Re-emits the function with `extra_attrs` and a new body.
    ///
    /// Inner attributes move in front of the function, blocks do not accept
    /// them.
    pub(crate) fn emit(self, extra_attrs: TokenStream, body: TokenStream) -> TokenStream {
        let mut tokens = TokenStream::new();

        tokens.append_all(&self.attrs);
        for mut attr in self.inner_attrs {
            attr.style = AttrStyle::Outer;
            attr.to_tokens(&mut tokens);
        }
        tokens.extend(extra_attrs);

        self.vis.to_tokens(&mut tokens);
        self.sig.to_tokens(&mut tokens);
        self.brace
            .surround(&mut tokens, |tokens| tokens.extend(body));

        tokens
    }
}

impl Parse for EntryFn {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let vis = input.parse()?;
        let sig = input.parse()?;

        let content;
        let brace = braced!(content in input);
        let inner_attrs = content.call(Attribute::parse_inner)?;
        let body = content.parse()?;

        Ok(EntryFn {
            attrs,
            vis,
            sig,
            brace,
            inner_attrs,
            body,
        })
    }
}

/// `name = literal` or a bare `name`, as found in the macro arguments.
pub(crate) enum Arg {
    Value { name: syn::Ident, lit: Lit },
    Flag(syn::Ident),
}

impl Parse for Arg {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let name: syn::Ident = input.parse()?;

        if !input.peek(Token![=]) {
            return Ok(Arg::Flag(name));
        }

        input.parse::<Token![=]>()?;
        let lit = input.parse::<Lit>().map_err(|err| {
            syn::Error::new(err.span(), format!("`{name}` must be set to a literal."))
        })?;

        Ok(Arg::Value { name, lit })
    }
}

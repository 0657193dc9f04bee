//! Expansion of `#[rondo::main]` and `#[rondo::test]`.
use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{Ident, Lit, Token};

use crate::parse::{Arg, EntryFn, is_builtin_test, lit_bool, lit_count, with_error};

#[derive(Clone, Copy)]
pub(crate) enum Entry {
    Main,
    Test,
}

impl Entry {
    fn macro_name(self) -> &'static str {
        match self {
            Entry::Main => "rondo::main",
            Entry::Test => "rondo::test",
        }
    }
}

/// Runtime builder settings picked from the macro arguments. Unset knobs keep
/// the builder defaults.
#[derive(Default)]
struct Knobs {
    start_paused: Option<bool>,
    blocking_threads: Option<usize>,
}

const KNOWN_KNOBS: &str = "`start_paused`, `blocking_threads`";

impl Knobs {
    fn from_args(entry: Entry, args: TokenStream) -> syn::Result<Self> {
        let args = Punctuated::<Arg, Token![,]>::parse_terminated.parse2(args)?;
        let mut knobs = Knobs::default();

        for arg in args {
            match arg {
                Arg::Value { name, lit } => knobs.set(&name, &lit)?,
                Arg::Flag(name) => return Err(flag_error(entry, &name)),
            }
        }

        Ok(knobs)
    }

    fn set(&mut self, name: &Ident, lit: &Lit) -> syn::Result<()> {
        let knob = name.to_string();

        let already_set = match knob.as_str() {
            "start_paused" => self
                .start_paused
                .replace(lit_bool(lit, &knob)?)
                .is_some(),
            "blocking_threads" => self
                .blocking_threads
                .replace(lit_count(lit, &knob)?)
                .is_some(),
            _ => {
                let msg = format!("unknown option `{knob}`, expected one of: {KNOWN_KNOBS}");
                return Err(syn::Error::new_spanned(name, msg));
            }
        };

        if already_set {
            return Err(syn::Error::new_spanned(
                name,
                format!("`{knob}` set multiple times."),
            ));
        }
        Ok(())
    }

    /// Chain of builder calls ending in a built runtime.
    fn runtime(&self, span: Span) -> TokenStream {
        let mut calls = TokenStream::new();

        if let Some(paused) = self.start_paused {
            calls.extend(quote_spanned! {span=> .start_paused(#paused) });
        }
        if let Some(threads) = self.blocking_threads {
            calls.extend(quote_spanned! {span=> .blocking_threads(#threads) });
        }

        quote_spanned! {span=>
            rondo::runtime::Builder::new_local()
                #calls
                .try_build()
                .expect("Failed building the Runtime")
        }
    }
}

fn flag_error(entry: Entry, name: &Ident) -> syn::Error {
    let msg = match name.to_string().as_str() {
        "start_paused" => format!(
            "Pause the clock with #[{}(start_paused = true)].",
            entry.macro_name()
        ),
        "blocking_threads" => "`blocking_threads` takes a value, e.g. `blocking_threads = 2`.".into(),
        "flavor" | "worker_threads" | "multi_thread" => {
            "The runtime is single-threaded, there is no flavor to pick.".into()
        }
        other => format!("unknown option `{other}`, expected one of: {KNOWN_KNOBS}"),
    };
    syn::Error::new_spanned(name, msg)
}

/// Checks that the annotated function can be an entry point.
fn validate(entry: Entry, input: &EntryFn) -> syn::Result<()> {
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            input.sig.fn_token,
            "the `async` keyword is missing from the function declaration",
        ));
    }

    match entry {
        Entry::Main if input.sig.ident == "main" && !input.sig.inputs.is_empty() => {
            Err(syn::Error::new_spanned(
                &input.sig.ident,
                "the main function cannot accept arguments",
            ))
        }
        Entry::Test => match input.all_attrs().find(|attr| is_builtin_test(attr.path())) {
            Some(attr) => Err(syn::Error::new_spanned(
                attr,
                "a second test attribute is supplied, remove it or put it before this one",
            )),
            None => Ok(()),
        },
        Entry::Main => Ok(()),
    }
}

/// Entry point for both macros.
///
/// On any error the function is still expanded, with default knobs, and the
/// error appended. Completions keep working on half-written code that way.
pub(crate) fn expand(entry: Entry, args: TokenStream, item: TokenStream) -> TokenStream {
    let input: EntryFn = match syn::parse2(item.clone()) {
        Ok(input) => input,
        Err(err) => return with_error(item, err),
    };

    let knobs = validate(entry, &input).and_then(|()| Knobs::from_args(entry, args));

    match knobs {
        Ok(knobs) => rewrite(entry, input, &knobs),
        Err(err) => with_error(rewrite(entry, input, &Knobs::default()), err),
    }
}

/// Turns `async fn f() -> T { body }` into `fn f() -> T { block_on(async { body }) }`.
fn rewrite(entry: Entry, mut input: EntryFn, knobs: &Knobs) -> TokenStream {
    input.sig.asyncness = None;

    // Output mismatches are reported on the last statement, so the `return`
    // carries its spans.
    let (tail_start, tail_end) = input.tail_spans();
    let runtime = knobs.runtime(tail_start);

    let block = input.block();

    let (extra_attrs, future) = match entry {
        Entry::Main => (quote! {}, quote! { let body = async #block; }),
        Entry::Test => {
            let output = match &input.sig.output {
                syn::ReturnType::Default => quote! { () },
                syn::ReturnType::Type(_, ty) => quote! { #ty },
            };
            // One `block_on` instantiation for every test in the crate.
            let future = quote! {
                let body = ::core::pin::pin!(async #block);
                let body: ::core::pin::Pin<&mut dyn ::core::future::Future<Output = #output>> = body;
            };
            (quote! { #[::core::prelude::v1::test] }, future)
        }
    };

    let run = quote_spanned! {tail_end=>
        #[allow(
            clippy::expect_used,
            clippy::diverging_sub_expression,
            clippy::needless_return,
            clippy::unwrap_in_result
        )]
        {
            return #runtime.block_on(body);
        }
    };

    input.emit(extra_attrs, quote! { #future #run })
}

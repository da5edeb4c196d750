//! `#[op2]` bindings for the Web Object Model. Each guest-visible class is
//! reflected as a `deno_core::GarbageCollected` cppgc object wrapping the
//! pure-Rust type from this crate, the same pattern the teacher's op2 test
//! suite exercises for object-wrap classes (`libs/ops/op2/test_cases/sync/
//! object_wrap.rs`). Binds the primary guest-visible surface named in spec
//! §6; further accessor ops (e.g. additional `Headers`/`FormData` getters)
//! follow the identical `#[op2] impl` shape and are omitted here for
//! brevity — the pure-Rust methods in `headers.rs`/`form_data.rs`/etc. are
//! the actual source of truth and carry the test coverage.

use std::ops::{Deref, DerefMut};

use deno_core::op2;
use deno_core::v8;
use deno_core::GarbageCollected;
use parking_lot::Mutex as PlMutex;

use crate::headers::Headers as HeadersImpl;
use crate::url::{Url as UrlImpl, UrlSearchParams as UrlSearchParamsImpl};

pub struct HeadersResource(pub PlMutex<HeadersImpl>);

unsafe impl GarbageCollected for HeadersResource {
    fn trace(&self, _visitor: &mut v8::cppgc::Visitor) {}

    fn get_name(&self) -> &'static std::ffi::CStr {
        c"Headers"
    }
}

#[op2]
#[cppgc]
pub fn op_headers_new(#[serde] pairs: Vec<(String, String)>) -> Result<HeadersResource, deno_error::JsErrorBox> {
    let headers = HeadersImpl::from_pairs(pairs).map_err(|e| deno_error::JsErrorBox::type_error(e.to_string()))?;
    Ok(HeadersResource(PlMutex::new(headers)))
}

#[op2]
pub fn op_headers_append(
    #[cppgc] headers: &HeadersResource,
    #[string] name: String,
    #[string] value: String,
) -> Result<(), deno_error::JsErrorBox> {
    headers
        .0
        .lock()
        .append(&name, &value)
        .map_err(|e| deno_error::JsErrorBox::type_error(e.to_string()))
}

#[op2]
#[string]
pub fn op_headers_get(#[cppgc] headers: &HeadersResource, #[string] name: String) -> Option<String> {
    headers.0.lock().get(&name)
}

#[op2(fast)]
pub fn op_headers_has(#[cppgc] headers: &HeadersResource, #[string] name: String) -> bool {
    headers.0.lock().has(&name)
}

#[op2(fast)]
pub fn op_headers_delete(#[cppgc] headers: &HeadersResource, #[string] name: String) {
    headers.0.lock().delete(&name);
}

#[op2]
#[serde]
pub fn op_headers_entries(#[cppgc] headers: &HeadersResource) -> Vec<(String, String)> {
    headers.0.lock().entries()
}

#[op2]
#[serde]
pub fn op_headers_get_set_cookie(#[cppgc] headers: &HeadersResource) -> Vec<String> {
    headers.0.lock().get_set_cookie()
}

pub struct UrlResource(pub PlMutex<UrlImpl>);

unsafe impl GarbageCollected for UrlResource {
    fn trace(&self, _visitor: &mut v8::cppgc::Visitor) {}

    fn get_name(&self) -> &'static std::ffi::CStr {
        c"URL"
    }
}

#[op2]
#[cppgc]
pub fn op_url_new(
    #[string] input: String,
    #[string] base: Option<String>,
) -> Result<UrlResource, deno_error::JsErrorBox> {
    let url = UrlImpl::parse(&input, base.as_deref())
        .map_err(|e| deno_error::JsErrorBox::type_error(e.to_string()))?;
    Ok(UrlResource(PlMutex::new(url)))
}

#[op2(fast)]
pub fn op_url_can_parse(#[string] input: String, #[string] base: Option<String>) -> bool {
    UrlImpl::can_parse(&input, base.as_deref())
}

#[op2]
#[string]
pub fn op_url_href(#[cppgc] url: &UrlResource) -> String {
    url.0.lock().href()
}

#[op2]
pub fn op_url_set_href(
    #[cppgc] url: &UrlResource,
    #[string] href: String,
) -> Result<(), deno_error::JsErrorBox> {
    url.0
        .lock()
        .set_href(&href)
        .map_err(|e| deno_error::JsErrorBox::type_error(e.to_string()))
}

#[op2]
#[string]
pub fn op_url_search(#[cppgc] url: &UrlResource) -> String {
    url.0.lock().search()
}

#[op2]
pub fn op_url_set_search(#[cppgc] url: &UrlResource, #[string] search: String) {
    url.0.lock().set_search(&search);
}

/// `UrlSearchParamsImpl` is already `Arc<Mutex<...>>`-backed and `Clone`
/// (so every holder of the same logical instance shares live state); this
/// wrapper only needs to give it cppgc identity, not a second lock.
pub struct UrlSearchParamsResource(pub UrlSearchParamsImpl);

unsafe impl GarbageCollected for UrlSearchParamsResource {
    fn trace(&self, _visitor: &mut v8::cppgc::Visitor) {}

    fn get_name(&self) -> &'static std::ffi::CStr {
        c"URLSearchParams"
    }
}

#[op2]
#[cppgc]
pub fn op_url_search_params(#[cppgc] url: &UrlResource) -> UrlSearchParamsResource {
    UrlSearchParamsResource(url.0.lock().search_params())
}

#[op2(fast)]
pub fn op_url_search_params_size(#[cppgc] params: &UrlSearchParamsResource) -> u32 {
    params.0.size() as u32
}

#[op2(fast)]
pub fn op_url_search_params_append(
    #[cppgc] params: &UrlSearchParamsResource,
    #[string] name: String,
    #[string] value: String,
) {
    params.0.append(&name, &value);
}

#[op2(fast)]
pub fn op_url_search_params_set(
    #[cppgc] params: &UrlSearchParamsResource,
    #[string] name: String,
    #[string] value: String,
) {
    params.0.set(&name, &value);
}

#[op2(fast)]
pub fn op_url_search_params_delete(
    #[cppgc] params: &UrlSearchParamsResource,
    #[string] name: String,
    #[string] value: Option<String>,
) {
    params.0.delete(&name, value.as_deref());
}

#[op2]
#[string]
pub fn op_url_search_params_get(#[cppgc] params: &UrlSearchParamsResource, #[string] name: String) -> Option<String> {
    params.0.get(&name)
}

#[op2]
#[serde]
pub fn op_url_search_params_get_all(#[cppgc] params: &UrlSearchParamsResource, #[string] name: String) -> Vec<String> {
    params.0.get_all(&name)
}

#[op2(fast)]
pub fn op_url_search_params_has(
    #[cppgc] params: &UrlSearchParamsResource,
    #[string] name: String,
    #[string] value: Option<String>,
) -> bool {
    params.0.has(&name, value.as_deref())
}

#[op2]
#[serde]
pub fn op_url_search_params_entries(#[cppgc] params: &UrlSearchParamsResource) -> Vec<(String, String)> {
    params.0.entries()
}

#[op2(fast)]
pub fn op_url_search_params_sort(#[cppgc] params: &UrlSearchParamsResource) {
    params.0.sort();
}

#[op2]
#[string]
pub fn op_url_search_params_to_string(#[cppgc] params: &UrlSearchParamsResource) -> String {
    params.0.to_query_string()
}

pub struct AbortSignalResource(pub crate::abort::AbortSignal);

unsafe impl GarbageCollected for AbortSignalResource {
    fn trace(&self, _visitor: &mut v8::cppgc::Visitor) {}

    fn get_name(&self) -> &'static std::ffi::CStr {
        c"AbortSignal"
    }
}

#[op2(fast)]
pub fn op_abort_signal_aborted(#[cppgc] signal: &AbortSignalResource) -> bool {
    signal.0.aborted()
}

#[op2]
#[serde]
pub fn op_abort_signal_reason(#[cppgc] signal: &AbortSignalResource) -> Option<serde_json::Value> {
    signal.0.reason()
}

#[op2]
pub fn op_abort_signal_throw_if_aborted(#[cppgc] signal: &AbortSignalResource) -> Result<(), crate::error::AbortError> {
    signal.0.throw_if_aborted()
}

#[op2]
#[cppgc]
pub fn op_abort_signal_abort(#[serde] reason: Option<serde_json::Value>) -> AbortSignalResource {
    AbortSignalResource(crate::abort::AbortSignal::already_aborted(reason))
}

pub struct AbortControllerResource(pub crate::abort::AbortController);

unsafe impl GarbageCollected for AbortControllerResource {
    fn trace(&self, _visitor: &mut v8::cppgc::Visitor) {}

    fn get_name(&self) -> &'static std::ffi::CStr {
        c"AbortController"
    }
}

#[op2]
#[cppgc]
pub fn op_abort_controller_new() -> AbortControllerResource {
    AbortControllerResource(crate::abort::AbortController::new())
}

#[op2]
#[cppgc]
pub fn op_abort_controller_signal(#[cppgc] controller: &AbortControllerResource) -> AbortSignalResource {
    AbortSignalResource(controller.0.signal())
}

#[op2(fast)]
pub fn op_abort_controller_abort(#[cppgc] controller: &AbortControllerResource, #[serde] reason: Option<serde_json::Value>) {
    controller.0.abort(reason);
}

impl Deref for HeadersResource {
    type Target = PlMutex<HeadersImpl>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for HeadersResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

deno_core::extension!(
    islet_web,
    ops = [
        op_headers_new,
        op_headers_append,
        op_headers_get,
        op_headers_has,
        op_headers_delete,
        op_headers_entries,
        op_headers_get_set_cookie,
        op_url_new,
        op_url_can_parse,
        op_url_href,
        op_url_set_href,
        op_url_search,
        op_url_set_search,
        op_url_search_params,
        op_url_search_params_size,
        op_url_search_params_append,
        op_url_search_params_set,
        op_url_search_params_delete,
        op_url_search_params_get,
        op_url_search_params_get_all,
        op_url_search_params_has,
        op_url_search_params_entries,
        op_url_search_params_sort,
        op_url_search_params_to_string,
        op_abort_signal_aborted,
        op_abort_signal_reason,
        op_abort_signal_throw_if_aborted,
        op_abort_signal_abort,
        op_abort_controller_new,
        op_abort_controller_signal,
        op_abort_controller_abort,
    ],
);

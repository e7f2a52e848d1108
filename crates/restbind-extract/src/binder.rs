//! Binds declared method parameters to request data.
//!
//! Text sources (path, query, header, cookie, form, matrix) go through the
//! parameter's text conversion, falling back to its default value. The body
//! goes through a reader resolved for the parameter type and the request's
//! content type. Context parameters come from request-scoped data, asking a
//! registered context provider when nothing was supplied yet. The request
//! itself and the authenticated user, as [`CurrentUser`], are always
//! available as context values.
//!
//! A reader or provider that cannot be constructed is skipped: the body is
//! then converted from text and the context value counts as absent.

use std::any::TypeId;
use std::sync::Arc;

use restbind_core::plugin::{PluginEntry, ReadValue, ValueReader};
use restbind_core::{
    ArgValue, Arguments, Container, CurrentUser, HttpRequest, MediaType, MethodParameter, ParamSource, RestError,
    RestResult, RouteDefinition,
};
use restbind_router::{Params, RequestParts};
use tracing::{debug, trace, warn};

use crate::parse::parse_query;
use crate::registry::Registry;

/// Builds [`Arguments`] for a route invocation.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentBinder<'a> {
    registry: &'a Registry,
    container: &'a Container,
}

impl<'a> ArgumentBinder<'a> {
    /// Binder resolving plugins from `registry`, constructing them through `container`.
    #[must_use]
    pub const fn new(registry: &'a Registry, container: &'a Container) -> Self {
        Self { registry, container }
    }

    /// Binds every declared parameter of `definition`, in declaration order.
    ///
    /// # Errors
    ///
    /// - [`RestError::MissingParameter`] when a required value is absent
    /// - [`RestError::ParameterConversionFailed`] when a value does not convert
    /// - [`RestError::TypeMismatch`] when the body reader cannot produce the parameter type
    pub fn bind(&self, definition: &RouteDefinition, parts: &mut RequestParts) -> RestResult<Arguments> {
        let query = if definition
            .parameters()
            .iter()
            .any(|p| p.source() == ParamSource::Query)
        {
            parse_query(parts.request().query())?
        } else {
            Params::new()
        };

        let mut arguments = Arguments::new();
        for parameter in definition.parameters() {
            let value = match parameter.source() {
                ParamSource::Body => self.bind_body(definition, parameter, parts.request())?,
                ParamSource::Context => self.bind_context(parameter, parts)?,
                ParamSource::Path => convert_raw(parameter, parts.params.get(parameter.name()))?,
                ParamSource::Query => convert_raw(parameter, query.get(parameter.name()))?,
                ParamSource::Header => convert_raw(parameter, parts.request().header(parameter.name()))?,
                ParamSource::Cookie => convert_raw(parameter, parts.cookies.get(parameter.name()))?,
                ParamSource::Form => convert_raw(parameter, parts.form.get(parameter.name()))?,
                ParamSource::Matrix => convert_raw(parameter, parts.matrix.get(parameter.name()))?,
            };
            trace!(name = parameter.name(), source = %parameter.source(), present = value.is_some(), "parameter bound");
            arguments.push(parameter.name(), parameter.source(), value);
        }
        Ok(arguments)
    }

    /// Reader for `parameter` when the body arrives as one of `media`.
    ///
    /// A route-level reader wins over registered ones. When the chosen reader
    /// was matched by media type only and the route checks compatibility, its
    /// declared type must be assignable to the parameter type.
    pub fn body_reader(
        &self,
        definition: &RouteDefinition,
        parameter: &MethodParameter,
        media: &[MediaType],
    ) -> RestResult<Option<Arc<dyn ValueReader>>> {
        let wanted = parameter.descriptor();
        let (entry, checked) = match definition.reader() {
            Some(entry) => {
                let checked = entry.target().is_anything() || entry.target().is_assignable_to(wanted);
                (entry.clone(), checked)
            }
            None => match self.registry.reader_for(wanted, media) {
                Some(resolved) => {
                    let checked = !resolved.is_unchecked();
                    (resolved.entry, checked)
                }
                None => return Ok(None),
            },
        };

        if !checked && definition.check_compatibility() {
            entry.target().check_assignable_to(
                wanted,
                format_args!("{definition} - body parameter not readable by '{}'", entry.name()),
            )?;
        }
        let reader = self.construct(&entry)?;
        if reader.is_some() {
            debug!(route = %definition, reader = entry.name(), "body reader selected");
        }
        Ok(reader)
    }

    /// Builds the plugin behind `entry`, or `None` when it cannot be constructed.
    fn construct<P: ?Sized>(&self, entry: &PluginEntry<P>) -> RestResult<Option<Arc<P>>> {
        match entry.get(self.container) {
            Ok(plugin) => Ok(Some(plugin)),
            Err(e @ RestError::PluginConstructionFailed { .. }) => {
                warn!(plugin = entry.name(), error = %e, "plugin unavailable, using the default");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn bind_body(
        &self,
        definition: &RouteDefinition,
        parameter: &MethodParameter,
        request: &HttpRequest,
    ) -> RestResult<Option<ArgValue>> {
        let body = request.body();
        if body.is_empty() {
            return convert_raw(parameter, None);
        }

        let media = body_media(definition, request);
        let Some(reader) = self.body_reader(definition, parameter, &media)? else {
            let text = std::str::from_utf8(body).map_err(|e| {
                RestError::conversion(ParamSource::Body, parameter.name(), "UTF-8 text", e.to_string())
            })?;
            return parameter.convert_text(text).map(|v| Some(ArgValue::Owned(v)));
        };

        let value = match reader.read(body, request)? {
            ReadValue::Typed(value) => {
                if (*value).type_id() != parameter.descriptor().tag().id() {
                    return Err(RestError::type_mismatch(format!(
                        "{definition} - reader produced a value that is not '{}'",
                        parameter.descriptor()
                    )));
                }
                value
            }
            ReadValue::Json(document) => parameter.convert_json(document)?,
            ReadValue::Text(text) => parameter.convert_text(&text)?,
        };
        Ok(Some(ArgValue::Owned(value)))
    }

    fn bind_context(&self, parameter: &MethodParameter, parts: &mut RequestParts) -> RestResult<Option<ArgValue>> {
        let wanted = parameter.descriptor();
        if let Some(found) = parts.data.lookup(wanted) {
            return Ok(Some(ArgValue::Shared(found.value())));
        }

        let wanted_id = wanted.tag().id();
        if wanted_id == TypeId::of::<HttpRequest>() {
            return Ok(Some(ArgValue::Shared(parts.request_arc())));
        }
        if wanted_id == TypeId::of::<CurrentUser>() {
            if let Some(user) = &parts.user {
                return Ok(Some(ArgValue::Shared(Arc::new(CurrentUser::new(Arc::clone(user))))));
            }
        }

        let provider = match self.registry.provider_for(wanted) {
            Some(resolved) => self.construct(&resolved.entry)?.map(|p| (p, resolved.entry)),
            None => None,
        };
        if let Some((provider, entry)) = provider {
            if let Some(provided) = provider.provide(parts.request())? {
                debug!(provider = entry.name(), kind = %provided.descriptor(), "context value provided on demand");
                let usable = provided.descriptor().is_assignable_to(wanted);
                let shared = provided.value();
                if let Some(user) = provided.as_user() {
                    parts.user = Some(user);
                }
                parts.data.insert(provided);
                if usable {
                    return Ok(Some(ArgValue::Shared(shared)));
                }
            }
        }

        if parameter.is_required() {
            Err(RestError::missing_parameter(ParamSource::Context, parameter.name()))
        } else {
            Ok(None)
        }
    }
}

/// Media types a request body is read as: its content type, else what the route consumes.
#[must_use]
pub fn body_media(definition: &RouteDefinition, request: &HttpRequest) -> Vec<MediaType> {
    match request.content_type() {
        Some(content_type) => vec![content_type],
        None if definition.consumes().is_empty() => vec![MediaType::wildcard()],
        None => definition.consumes().to_vec(),
    }
}

fn convert_raw(parameter: &MethodParameter, raw: Option<&str>) -> RestResult<Option<ArgValue>> {
    match raw.or_else(|| parameter.default()) {
        Some(text) => parameter.convert_text(text).map(|v| Some(ArgValue::Owned(v))),
        None if parameter.is_required() => Err(RestError::missing_parameter(parameter.source(), parameter.name())),
        None => Ok(None),
    }
}

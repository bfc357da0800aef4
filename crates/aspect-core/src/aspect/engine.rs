//! Aspect engines: elemento + cache de resultados + carga diferida opcional.
//!
//! En vez de una cadena de herencia, un engine concreto implementa sólo el
//! cómputo (`AspectCompute`) y `AspectEngine<C>` lo compone con las
//! capacidades opcionales:
//! - cache (`FlowCache`) consultada con una `CacheKey` derivada del filtro
//!   del propio engine;
//! - lazy loading (`LazyLoadingConfig`): el cómputo corre en su propio hilo y
//!   `process` no lo espera.
//!
//! Orden de `process`:
//! 1. Con cache: derivar clave y buscar. Un hit copia los valores cacheados al
//!    output de la petición y retorna sin invocar el cómputo.
//! 2. Obtener o crear el output y registrar el engine como contribuyente.
//! 3. Con lazy loading: lanzar el cómputo en segundo plano.
//! 4. Sin lazy loading: computar inline.
//! 5. Tras el cómputo, guardar en cache con la misma clave la instancia donde
//!    se calculó (no el output de la petición, que otros engines pueden seguir
//!    escribiendo).

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use std::thread;

use log::{debug, trace};

use super::cache::{FlowCache, LruFlowCache};
use super::lazy::{LazyLoadHandle, LazyLoadingConfig};
use crate::data::{CacheKey, ElementData, FlowData};
use crate::element::FlowElement;
use crate::errors::PipelineError;
use crate::evidence::EvidenceKeyFilter;
use crate::model::ElementPropertyMetaData;
use crate::pipeline::Pipeline;

/// Cómputo específico de un aspect engine.
pub trait AspectCompute: Send + Sync + 'static {
    fn element_data_key(&self) -> &str;

    fn evidence_key_filter(&self) -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError>;

    fn properties(&self) -> Result<Vec<ElementPropertyMetaData>, PipelineError> {
        Ok(Vec::new())
    }

    /// Origen de los datos (p. ej. `"cloud"`, `"Lite"`).
    fn data_source_tier(&self) -> String;

    /// Escribe los resultados en `output`.
    fn compute(&self, data: &FlowData, output: &ElementData) -> Result<(), PipelineError>;

    /// Ver `FlowElement::added_to_pipeline`.
    fn added_to_pipeline(&self, _pipeline: &Arc<Pipeline>) {}

    fn close(&self) {}
}

pub struct AspectEngine<C: AspectCompute> {
    compute: Arc<C>,
    cache: Option<Arc<dyn FlowCache>>,
    lazy_loading: Option<LazyLoadingConfig>,
    mark_cache_hits: bool,
}

/// Calcula en una instancia propia y copia el resultado al output de la
/// petición, también si el cómputo falla a medias. Sólo un cómputo completo se
/// guarda en cache, y esa instancia no se vuelve a escribir.
fn compute_into<C: AspectCompute>(compute: &C,
                                  cache: Option<&Arc<dyn FlowCache>>,
                                  key: Option<CacheKey>,
                                  data: &FlowData,
                                  output: &ElementData)
                                  -> Result<(), PipelineError> {
    let computed = ElementData::new(compute.element_data_key());
    let result = compute.compute(data, &computed);
    output.merge_from(&computed);
    result?;
    if let (Some(cache), Some(key)) = (cache, key) {
        trace!("{}: caching output under {:?}", compute.element_data_key(), key);
        cache.put(key, Arc::new(computed));
    }
    Ok(())
}

impl<C: AspectCompute> AspectEngine<C> {
    pub fn builder(compute: C) -> AspectEngineBuilder<C> {
        AspectEngineBuilder { compute,
                              cache: None,
                              lazy_loading: None,
                              mark_cache_hits: false }
    }

    /// Engine sin cache ni lazy loading.
    pub fn new(compute: C) -> Self {
        Self::builder(compute).build()
    }

    pub fn compute(&self) -> &C {
        &self.compute
    }

    pub fn cache(&self) -> Option<&Arc<dyn FlowCache>> {
        self.cache.as_ref()
    }

    pub fn lazy_loading(&self) -> Option<&LazyLoadingConfig> {
        self.lazy_loading.as_ref()
    }

    pub fn data_source_tier(&self) -> String {
        self.compute.data_source_tier()
    }

    fn engine_name() -> &'static str {
        type_name::<C>()
    }

    fn spawn_lazy(&self,
                  config: &LazyLoadingConfig,
                  data: &FlowData,
                  output: Arc<ElementData>,
                  key: Option<CacheKey>)
                  -> Result<(), PipelineError> {
        let covered = self.compute
                          .properties()
                          .map(|props| props.into_iter().map(|p| p.name).collect())
                          .unwrap_or_default();
        let handle = Arc::new(LazyLoadHandle::new(covered, config.clone()));
        output.attach_lazy(handle.clone());

        let compute = self.compute.clone();
        let cache = self.cache.clone();
        let data = data.clone();
        let unit_handle = handle.clone();
        let element_key = compute.element_data_key().to_string();
        let spawned = thread::Builder::new().name(format!("lazy-{element_key}"))
                                            .spawn(move || {
                                                let result = compute_into(compute.as_ref(), cache.as_ref(), key, &data, &output);
                                                if let Err(e) = &result {
                                                    data.add_error(e.clone(), Some(&element_key), false, true);
                                                }
                                                unit_handle.complete(result);
                                            });
        if let Err(e) = spawned {
            let err = PipelineError::Processing(format!("could not start lazy load: {e}"));
            handle.complete(Err(err.clone()));
            return Err(err);
        }
        Ok(())
    }
}

impl<C: AspectCompute> FlowElement for AspectEngine<C> {
    fn element_data_key(&self) -> &str {
        self.compute.element_data_key()
    }

    fn evidence_key_filter(&self) -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError> {
        self.compute.evidence_key_filter()
    }

    fn properties(&self) -> Result<Vec<ElementPropertyMetaData>, PipelineError> {
        self.compute.properties()
    }

    fn process_data(&self, data: &FlowData) -> Result<(), PipelineError> {
        let element_key = self.compute.element_data_key();

        let cache_key = match &self.cache {
            Some(cache) => {
                let filter = self.compute.evidence_key_filter()?;
                let key = data.generate_key(filter.as_ref());
                if let Some(hit) = cache.get(&key) {
                    debug!("flow {}: cache hit for '{element_key}' {:?}", data.id(), key);
                    let output = data.get_or_add(element_key, || ElementData::new(element_key));
                    output.merge_from(&hit);
                    output.add_engine(Self::engine_name());
                    if self.mark_cache_hits {
                        data.mark_cache_hit(element_key);
                    }
                    return Ok(());
                }
                Some(key)
            }
            None => None,
        };

        let output = data.get_or_add(element_key, || ElementData::new(element_key));
        output.add_engine(Self::engine_name());

        match &self.lazy_loading {
            Some(config) => self.spawn_lazy(config, data, output, cache_key),
            None => compute_into(self.compute.as_ref(), self.cache.as_ref(), cache_key, data, &output),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn added_to_pipeline(&self, pipeline: &Arc<Pipeline>) {
        self.compute.added_to_pipeline(pipeline);
    }

    fn close(&self) {
        self.compute.close();
    }
}

impl<C: AspectCompute> fmt::Debug for AspectEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectEngine")
         .field("engine", &Self::engine_name())
         .field("element_data_key", &self.compute.element_data_key())
         .field("cache", &self.cache)
         .field("lazy_loading", &self.lazy_loading)
         .finish()
    }
}

/// Builder de `AspectEngine`.
pub struct AspectEngineBuilder<C: AspectCompute> {
    compute: C,
    cache: Option<Arc<dyn FlowCache>>,
    lazy_loading: Option<LazyLoadingConfig>,
    mark_cache_hits: bool,
}

impl<C: AspectCompute> AspectEngineBuilder<C> {
    /// Usa una implementación de cache propia.
    pub fn cache(mut self, cache: Arc<dyn FlowCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Cache LRU de `size` entradas; 0 desactiva la cache.
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache = (size > 0).then(|| Arc::new(LruFlowCache::new(size)) as Arc<dyn FlowCache>);
        self
    }

    pub fn lazy_loading(mut self, config: LazyLoadingConfig) -> Self {
        self.lazy_loading = Some(config);
        self
    }

    /// Marca en el `FlowData` los outputs servidos desde cache.
    pub fn mark_cache_hits(mut self, mark: bool) -> Self {
        self.mark_cache_hits = mark;
        self
    }

    pub fn build(self) -> AspectEngine<C> {
        AspectEngine { compute: Arc::new(self.compute),
                       cache: self.cache,
                       lazy_loading: self.lazy_loading,
                       mark_cache_hits: self.mark_cache_hits }
    }
}

/// Read-through caching around an upstream lookup.
///
/// `$cache` is an `Option<&Cache>`. With no cache the block simply runs. With
/// a cache, a hit is returned directly; a miss or a failed read runs the block
/// and queues the successful value for storage. Errors from the block are
/// propagated with `?` and never cached.
///
/// # Arguments
/// * `$cache`: `Option<&Cache>` to read from and write to.
/// * `$key`: The `CacheKey` under which the value lives.
/// * `$ttl`: The time-to-live (TTL) for the cached value in seconds.
/// * `$block`: Future computing the value on a miss.
///
/// # Example
/// ```rust,ignore
/// cached!(self.cache.as_ref(), key, ttl, async move {
///     fetch_from_upstream().await
/// })
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache {
            Some(cache) => match cache.get_from_cache(&$key).await {
                Ok(Some(hit)) => Ok(hit),
                lookup => {
                    if let Err(e) = lookup {
                        tracing::warn!(error = %e, key = %$key, "Cache read failed, using upstream");
                    }
                    let value = $block.await?;
                    cache.set_in_background(&$key, &value, $ttl);
                    Ok(value)
                }
            },
            None => $block.await,
        }
    }};
}

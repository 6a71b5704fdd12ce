use serde::Serialize;
use serde::de::DeserializeOwned;

/// A type exchanged between peers.
///
/// `NAME` is the route path segment: a payload is posted to `/<NAME>`.
///
/// ```ignore
/// #[derive(Default, Serialize, Deserialize)]
/// struct Ping { field: bool }
///
/// impl Payload for Ping {
///     const NAME: &'static str = "Ping";
/// }
/// ```
pub trait Payload: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    const NAME: &'static str;

    /// The route path for this payload.
    fn path() -> String {
        format!("/{}", Self::NAME)
    }
}

/// Single channel parsed from the upstream M3U. Ephemeral: the whole set is
/// recreated on every cache refresh and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub tvg_id: String,
    pub name: String,
    pub logo: String,
    pub group: String,
    pub title: String,
    pub url: String,
}

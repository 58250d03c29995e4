use std::fmt;

/// One replica endpoint of a batch: its position in the peer list and its base URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointTarget {
    index: usize,
    base_url: String,
}

impl EndpointTarget {
    pub fn new(index: usize, base_url: impl Into<String>) -> Self {
        Self {
            index,
            base_url: base_url.into(),
        }
    }

    /// Numbers the URLs in iteration order, starting at zero.
    pub fn from_urls<I, S>(urls: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(index, url)| Self::new(index, url))
            .collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl fmt::Display for EndpointTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{} {}", self.index, self.base_url)
    }
}

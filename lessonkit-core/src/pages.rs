//! Page selectors of the form `"1, 3,5"`: 1-based page numbers, in the
//! order the caller wants them.

use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    requested: Vec<i64>,
}

/// A selection checked against a document's page count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedSelection {
    /// Valid pages, 1-based, in request order.
    pub pages: Vec<u32>,
    /// Requested numbers outside `1..=total`.
    pub out_of_range: Vec<i64>,
}

impl PageSelection {
    pub fn requested(&self) -> &[i64] {
        &self.requested
    }

    pub fn resolve(&self, total_pages: u32) -> ResolvedSelection {
        let mut resolved = ResolvedSelection::default();
        for &page in &self.requested {
            if (1..=i64::from(total_pages)).contains(&page) {
                resolved.pages.push(page as u32);
            } else {
                resolved.out_of_range.push(page);
            }
        }
        resolved
    }
}

impl FromStr for PageSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requested = Vec::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let page = token
                .parse::<i64>()
                .map_err(|_| Error::InvalidSelection(format!("'{token}' is not a page number")))?;
            requested.push(page);
        }
        if requested.is_empty() {
            return Err(Error::InvalidSelection("no pages requested".to_string()));
        }
        Ok(Self { requested })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_keeps_request_order() {
        let sel: PageSelection = " 3, 1 ,2,".parse().unwrap();
        assert_eq!(sel.requested(), &[3, 1, 2]);
    }

    #[test]
    fn rejects_non_numeric_tokens() {
        assert!(matches!(
            "1,two".parse::<PageSelection>(),
            Err(Error::InvalidSelection(_))
        ));
        assert!(matches!(
            " , ".parse::<PageSelection>(),
            Err(Error::InvalidSelection(_))
        ));
    }

    #[test]
    fn resolve_reports_out_of_range_pages() {
        let sel: PageSelection = "0,1,5,6,-2".parse().unwrap();
        let resolved = sel.resolve(5);
        assert_eq!(resolved.pages, vec![1, 5]);
        assert_eq!(resolved.out_of_range, vec![0, 6, -2]);
    }
}

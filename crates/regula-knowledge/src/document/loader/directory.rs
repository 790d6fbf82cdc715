use std::path::{Path, PathBuf};

use super::super::{DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader};
#[cfg(feature = "pdf")]
use super::PdfLoader;
use super::{DocxLoader, HtmlLoader, TextLoader, extension};

/// A document that could not be loaded, with the reason.
#[derive(Debug)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub error: DocumentError,
}

/// Outcome of a directory load: parsed documents plus per-file failures.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedDocument>,
}

/// Walks a directory and dispatches each supported file to its format loader.
///
/// A file that fails to load is recorded in [`LoadReport::skipped`] and the walk
/// continues. Files whose extension is not in `formats` are ignored silently.
pub struct DirectoryLoader {
    formats: Vec<String>,
    text: TextLoader,
    html: HtmlLoader,
    docx: DocxLoader,
    #[cfg(feature = "pdf")]
    pdf: PdfLoader,
}

impl Default for DirectoryLoader {
    fn default() -> Self {
        Self::new(["pdf", "txt", "md", "html", "docx"], DEFAULT_MAX_FILE_SIZE)
    }
}

impl DirectoryLoader {
    #[must_use]
    pub fn new<I, S>(formats: I, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            formats: formats
                .into_iter()
                .map(|f| f.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            text: TextLoader { max_file_size },
            html: HtmlLoader { max_file_size },
            docx: DocxLoader { max_file_size },
            #[cfg(feature = "pdf")]
            pdf: PdfLoader { max_file_size },
        }
    }

    /// Load every supported file under `root`, in sorted path order.
    ///
    /// # Errors
    ///
    /// Returns `MissingDirectory` if `root` is not a directory. Per-file
    /// failures never abort the walk.
    pub async fn load_directory(&self, root: &Path) -> Result<LoadReport, DocumentError> {
        if !root.is_dir() {
            return Err(DocumentError::MissingDirectory(root.to_path_buf()));
        }

        let mut report = LoadReport::default();
        let mut paths = Vec::new();
        for entry in ignore::WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .build()
        {
            match entry {
                Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                    if self.is_selected(entry.path()) {
                        paths.push(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(root = %root.display(), "directory walk error: {e}");
                    report.skipped.push(SkippedDocument {
                        path: root.to_path_buf(),
                        error: DocumentError::Walk(e),
                    });
                }
            }
        }
        paths.sort();

        for path in paths {
            match self.load_file(&path).await {
                Ok(docs) => {
                    tracing::debug!(path = %path.display(), records = docs.len(), "loaded document");
                    report.documents.extend(docs);
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), "skipping document: {error}");
                    report.skipped.push(SkippedDocument { path, error });
                }
            }
        }

        tracing::info!(
            documents = report.documents.len(),
            skipped = report.skipped.len(),
            root = %root.display(),
            "directory loaded"
        );
        Ok(report)
    }

    /// Load one file, choosing the loader by extension.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` for formats without a loader (PDF when the
    /// `pdf` feature is off), or the format loader's error.
    pub async fn load_file(&self, path: &Path) -> Result<Vec<Document>, DocumentError> {
        let ext = extension(path);
        if self.text.supported_extensions().contains(&ext.as_str()) {
            return self.text.load(path).await;
        }
        if self.html.supported_extensions().contains(&ext.as_str()) {
            return self.html.load(path).await;
        }
        if self.docx.supported_extensions().contains(&ext.as_str()) {
            return self.docx.load(path).await;
        }
        #[cfg(feature = "pdf")]
        if self.pdf.supported_extensions().contains(&ext.as_str()) {
            return self.pdf.load(path).await;
        }
        Err(DocumentError::UnsupportedFormat(ext))
    }

    fn is_selected(&self, path: &Path) -> bool {
        let ext = extension(path);
        self.formats.iter().any(|f| {
            *f == ext || (f == "md" && ext == "markdown") || (f == "html" && ext == "htm")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_supported_and_reports_broken() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.md"), "# beta").unwrap();
        std::fs::write(dir.path().join("c.docx"), "binary").unwrap();
        std::fs::write(dir.path().join("ignored.csv"), "x,y").unwrap();

        let report = DirectoryLoader::default()
            .load_directory(dir.path())
            .await
            .unwrap();

        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.documents[0].content, "alpha");
        assert_eq!(report.documents[1].content, "# beta");
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("c.docx"));
        assert!(matches!(report.skipped[0].error, DocumentError::Docx(_)));
    }

    #[tokio::test]
    async fn default_formats_all_have_loaders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "text").unwrap();
        std::fs::write(dir.path().join("b.md"), "markdown").unwrap();
        std::fs::write(dir.path().join("c.html"), "<p>html</p>").unwrap();
        super::super::docx::tests::write_docx(
            &dir.path().join("d.docx"),
            "<w:p><w:r><w:t>docx</w:t></w:r></w:p>",
        );

        let loader = DirectoryLoader::default();
        let report = loader.load_directory(dir.path()).await.unwrap();
        assert!(report.skipped.is_empty());
        let formats: Vec<_> = report.documents.iter().map(|d| d.metadata.format.as_str()).collect();
        assert_eq!(formats, ["txt", "md", "html", "docx"]);

        for format in loader.formats.iter().filter(|f| cfg!(feature = "pdf") || *f != "pdf") {
            let path = dir.path().join(format!("missing.{format}"));
            assert!(
                !matches!(
                    loader.load_file(&path).await,
                    Err(DocumentError::UnsupportedFormat(_))
                ),
                "{format} has no loader"
            );
        }
    }

    #[tokio::test]
    async fn walks_subdirectories_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/z.txt"), "z").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let report = DirectoryLoader::new(["txt"], DEFAULT_MAX_FILE_SIZE)
            .load_directory(dir.path())
            .await
            .unwrap();
        let contents: Vec<_> = report.documents.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, ["a", "z"]);
    }

    #[tokio::test]
    async fn oversized_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "0123456789").unwrap();
        std::fs::write(dir.path().join("small.txt"), "ok").unwrap();

        let report = DirectoryLoader::new(["txt"], 5)
            .load_directory(dir.path())
            .await
            .unwrap();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(
            report.skipped[0].error,
            DocumentError::FileTooLarge(10)
        ));
    }

    #[tokio::test]
    async fn missing_directory_is_error() {
        let result = DirectoryLoader::default()
            .load_directory(Path::new("/nonexistent/regula-docs"))
            .await;
        assert!(matches!(result, Err(DocumentError::MissingDirectory(_))));
    }

    #[test]
    fn format_filter_accepts_aliases() {
        let loader = DirectoryLoader::new([".MD", "html"], DEFAULT_MAX_FILE_SIZE);
        assert!(loader.is_selected(Path::new("a.markdown")));
        assert!(loader.is_selected(Path::new("b.htm")));
        assert!(!loader.is_selected(Path::new("c.txt")));
    }
}

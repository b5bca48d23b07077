//! Fallback pipe: any remaining file is copied verbatim.

use super::{Pipe, PipeError, SiteFile};
use crate::config::PathResolver;
use std::path::Path;

pub(super) fn attempt(
    paths: PathResolver<'_>,
    relative: &Path,
) -> Result<Option<SiteFile>, PipeError> {
    let source = paths.to_source(relative)?;
    Ok(Some(SiteFile::new(
        Pipe::Copy,
        source,
        relative.to_path_buf(),
        Default::default(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layouts;
    use crate::pipes::{Render, SiteModel};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_copy_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let (source, target) = (dir.path().join("src"), dir.path().join("out"));
        fs::create_dir_all(source.join("img")).unwrap();
        let bytes: Vec<u8> = (0..=255).cycle().take(4096).collect();
        fs::write(source.join("img/logo.png"), &bytes).unwrap();

        let paths = PathResolver::new(&source, &target);
        let file = attempt(paths, Path::new("img/logo.png")).unwrap().unwrap();
        assert_eq!(file.pipe, Pipe::Copy);
        assert_eq!(file.render, Render::Copy);

        let layouts = Layouts::inline("{{{content}}}").unwrap();
        let site = SiteModel {
            globals: &Default::default(),
            pages: &[],
            layouts: &layouts,
            minify: true,
        };
        file.render(&target.join(&file.path), &site).unwrap();

        assert_eq!(fs::read(target.join("img/logo.png")).unwrap(), bytes);
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let paths = PathResolver::new(dir.path(), dir.path());

        assert!(matches!(
            attempt(paths, Path::new("nope.bin")),
            Err(PipeError::Path(_))
        ));
    }
}

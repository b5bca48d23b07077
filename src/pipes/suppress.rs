//! Claims sources that no longer exist and removes their stale output.

use super::{Pipe, Render, SiteFile, target_path};
use crate::config::{PathError, PathResolver};
use std::path::Path;

pub(super) fn attempt(
    paths: PathResolver<'_>,
    relative: &Path,
) -> Result<Option<SiteFile>, super::PipeError> {
    match paths.to_source(relative) {
        Ok(_) => Ok(None),
        Err(PathError::MissingResource(source)) if !source.exists() => {
            let file = SiteFile::new(
                Pipe::Suppress,
                source,
                target_path(relative),
                Default::default(),
            );
            Ok(Some(file.with_render(Render::Remove)))
        }
        Err(PathError::MissingResource(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::{PipeError, SiteModel};
    use crate::layout::Layouts;
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;

    #[test]
    fn test_claims_missing_source() {
        let dir = TempDir::new().unwrap();
        let (source, target) = (dir.path().join("src"), dir.path().join("out"));
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(target.join("guide")).unwrap();
        fs::write(target.join("guide/gone.html"), "stale").unwrap();

        let paths = PathResolver::new(&source, &target);
        let file = attempt(paths, Path::new("guide/gone.md")).unwrap().unwrap();

        assert_eq!(file.pipe, Pipe::Suppress);
        assert_eq!(file.path, PathBuf::from("guide/gone.html"));
        assert_eq!(file.render, Render::Remove);

        let layouts = Layouts::inline("{{{content}}}").unwrap();
        let site = SiteModel {
            globals: &Default::default(),
            pages: &[],
            layouts: &layouts,
            minify: false,
        };
        file.render(&target.join(&file.path), &site).unwrap();
        assert!(!target.join("guide/gone.html").exists());
    }

    #[test]
    fn test_ignores_existing_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.md"), "# a").unwrap();

        let paths = PathResolver::new(&source, dir.path());
        assert!(attempt(paths, Path::new("a.md")).unwrap().is_none());
    }

    #[test]
    fn test_ignores_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        let source = dir.path().join("src");

        let paths = PathResolver::new(&source, dir.path());
        assert!(attempt(paths, Path::new("sub")).unwrap().is_none());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();

        let paths = PathResolver::new(&source, dir.path());
        assert!(matches!(
            attempt(paths, Path::new("../../etc/passwd")),
            Err(PipeError::Path(PathError::OutOfBounds(..)))
        ));
    }
}

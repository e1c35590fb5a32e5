use filebox::{
    append_to_tar_gzip, append_to_tar_gzip_with, append_to_zip, append_to_zip_with, create_tar_gzip, create_zip,
    extract_tar_gzip, extract_zip, list_tar_gzip, list_zip, AppendOptions, EntryHeader, FileboxError, OuterLayer,
    TarEntryWriter, ZipEntryWriter,
};
use filebox::archive::WalkEvent;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn home(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root.join("docs"))?;
    fs::write(root.join("docs/a.txt"), b"alpha")?;
    fs::write(root.join("b.txt"), b"bravo")?;
    Ok(())
}

fn additions(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root.join("bob/nested"))?;
    fs::write(root.join("bob/nested/n.txt"), b"november")?;
    fs::write(root.join("log1.txt"), b"first log")?;
    Ok(())
}

#[test]
fn zip_append_keeps_old_entries_and_adds_outer_names() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    home(&work.path().join("home"))?;
    additions(work.path())?;
    let archive = work.path().join("home.zip");
    create_zip(work.path().join("home"), &archive)?;
    let before = list_zip(&archive)?;

    append_to_zip(&archive, &[work.path().join("bob"), work.path().join("log1.txt")])?;

    let after = list_zip(&archive)?;
    assert_eq!(&after[..before.len()], &before[..]);
    for name in ["bob/", "bob/nested/", "bob/nested/n.txt", "log1.txt"] {
        assert!(after.contains(&name.to_string()), "missing {name} in {after:?}");
    }

    let out = work.path().join("out");
    extract_zip(&archive, &out)?;
    assert_eq!(fs::read(out.join("docs/a.txt"))?, b"alpha");
    assert_eq!(fs::read(out.join("bob/nested/n.txt"))?, b"november");
    assert_eq!(fs::read(out.join("log1.txt"))?, b"first log");
    Ok(())
}

#[test]
fn tar_gzip_append_keeps_old_entries_and_adds_outer_names() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    home(&work.path().join("home"))?;
    additions(work.path())?;
    let archive = work.path().join("home.tgz");
    create_tar_gzip(work.path().join("home"), &archive, 6)?;

    append_to_tar_gzip(&archive, &[work.path().join("bob"), work.path().join("log1.txt")])?;

    let names = list_tar_gzip(&archive)?;
    for name in ["docs/a.txt", "b.txt", "bob/nested/n.txt", "log1.txt"] {
        assert!(names.contains(&name.to_string()), "missing {name} in {names:?}");
    }
    let out = work.path().join("out");
    extract_tar_gzip(&archive, &out)?;
    assert_eq!(fs::read(out.join("b.txt"))?, b"bravo");
    assert_eq!(fs::read(out.join("bob/nested/n.txt"))?, b"november");
    Ok(())
}

#[test]
fn zip_reappend_adds_a_duplicate_entry() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    home(&work.path().join("home"))?;
    let log = work.path().join("log1.txt");
    fs::write(&log, b"v1")?;
    let archive = work.path().join("home.zip");
    create_zip(work.path().join("home"), &archive)?;

    let mut counts = vec![list_zip(&archive)?.len()];
    for _ in 0..2 {
        append_to_zip(&archive, &[&log])?;
        counts.push(list_zip(&archive)?.len());
    }
    assert!(counts.windows(2).all(|w| w[1] > w[0]), "counts {counts:?}");
    assert_eq!(list_zip(&archive)?.iter().filter(|n| *n == "log1.txt").count(), 2);
    Ok(())
}

#[test]
fn tar_gzip_reappend_overwrites_through_the_scratch_tree() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    home(&work.path().join("home"))?;
    let log = work.path().join("log1.txt");
    fs::write(&log, b"v1")?;
    let archive = work.path().join("home.tgz");
    create_tar_gzip(work.path().join("home"), &archive, 6)?;

    append_to_tar_gzip(&archive, &[&log])?;
    let once = list_tar_gzip(&archive)?.len();
    fs::write(&log, b"v2")?;
    append_to_tar_gzip(&archive, &[&log])?;
    assert!(list_tar_gzip(&archive)?.len() > once);

    let out = work.path().join("out");
    extract_tar_gzip(&archive, &out)?;
    assert_eq!(fs::read(out.join("log1.txt"))?, b"v2");
    Ok(())
}

#[cfg(unix)]
#[test]
fn fifo_source_is_rejected_and_archive_untouched() -> Result<(), Box<dyn std::error::Error>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let work = tempdir()?;
    home(&work.path().join("home"))?;
    let fifo = work.path().join("pipe");
    let c_path = CString::new(fifo.as_os_str().as_bytes())?;
    assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);

    let zip = work.path().join("home.zip");
    create_zip(work.path().join("home"), &zip)?;
    let zip_bytes = fs::read(&zip)?;
    let err = append_to_zip(&zip, &[&fifo]).unwrap_err();
    assert!(err.is_not_regular_file(), "{err}");
    assert_eq!(fs::read(&zip)?, zip_bytes);

    let tgz = work.path().join("home.tgz");
    create_tar_gzip(work.path().join("home"), &tgz, 6)?;
    let tgz_bytes = fs::read(&tgz)?;
    let err = append_to_tar_gzip(&tgz, &[&fifo]).unwrap_err();
    assert!(matches!(err, FileboxError::NotRegularFile { .. }));
    assert_eq!(fs::read(&tgz)?, tgz_bytes);
    Ok(())
}

#[cfg(unix)]
#[test]
fn fifo_inside_appended_directory_fails_and_leaves_no_temp() -> Result<(), Box<dyn std::error::Error>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let work = tempdir()?;
    home(&work.path().join("home"))?;
    let dir = work.path().join("incoming");
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("ok.txt"), b"ok")?;
    let c_path = CString::new(dir.join("pipe").as_os_str().as_bytes())?;
    assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);

    let zip = work.path().join("home.zip");
    create_zip(work.path().join("home"), &zip)?;
    let before = fs::read(&zip)?;
    let scratch = work.path().join("scratch");
    let options = AppendOptions { temp_dir: Some(scratch.clone()), ..Default::default() };
    let err = append_to_zip_with(&options, &OuterLayer, &ZipEntryWriter::default(), &zip, &[&dir]).unwrap_err();

    assert!(err.is_not_regular_file(), "{err}");
    assert_eq!(fs::read(&zip)?, before);
    assert_eq!(fs::read_dir(&scratch)?.count(), 0);
    Ok(())
}

#[test]
fn append_to_missing_archive_fails() {
    let work = tempdir().unwrap();
    let log = work.path().join("log1.txt");
    fs::write(&log, b"x").unwrap();
    assert!(append_to_zip(work.path().join("none.zip"), &[&log]).is_err());
    assert!(append_to_tar_gzip(work.path().join("none.tgz"), &[&log]).is_err());
}

fn uppercase_names(event: WalkEvent<'_>) -> filebox::Result<Option<EntryHeader>> {
    use filebox::HeaderBuilder;
    Ok(OuterLayer.build(event)?.map(|mut header| {
        header.name = header.name.to_uppercase();
        header
    }))
}

#[test]
fn custom_header_builder_renames_entries() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    home(&work.path().join("home"))?;
    additions(work.path())?;
    let options = AppendOptions { temp_dir: Some(work.path().join("tmp")), level: 9 };

    let zip = work.path().join("home.zip");
    create_zip(work.path().join("home"), &zip)?;
    append_to_zip_with(&options, &uppercase_names, &ZipEntryWriter::default(), &zip, &[work.path().join("log1.txt")])?;
    assert!(list_zip(&zip)?.contains(&"LOG1.TXT".to_string()));

    let tgz = work.path().join("home.tgz");
    create_tar_gzip(work.path().join("home"), &tgz, 6)?;
    append_to_tar_gzip_with(&options, &uppercase_names, &TarEntryWriter, &tgz, &[work.path().join("bob")])?;
    let names = list_tar_gzip(&tgz)?;
    assert!(names.contains(&"BOB/NESTED/N.TXT".to_string()), "{names:?}");
    // Entries already in the archive go through the same builder when rebuilt.
    assert!(names.contains(&"DOCS/A.TXT".to_string()), "{names:?}");
    Ok(())
}

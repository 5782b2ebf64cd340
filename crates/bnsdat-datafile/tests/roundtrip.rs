//! End-to-end round trips through the public API.

use bnsdat_common::BinaryReader;
use bnsdat_datafile::codec::CompressedRecordReader;
use bnsdat_datafile::{
    Datafile, DatafileHeader, IntWidth, NameTable, ReadOptions, Record, Ref, StringLookupBuilder, Table,
    TableHeader, WriteOptions, TABLE_HEADER_SIZE,
};

const RECORD_SIZE: u16 = 32;

fn uncompressed_table(table_type: i16, records: i32) -> Table {
    let mut table = Table::new(TableHeader::new(table_type, 2, 1, false));
    let mut builder = table.string_builder().unwrap();
    for id in 1..=records {
        let mut record = Record::new(1, RECORD_SIZE, Ref::new(id, 0)).unwrap();
        record.set(16, id as i64 * 1000).unwrap();
        record.set_string(24, &mut builder, &format!("alias_{table_type}_{id}")).unwrap();
        record.set_string(28, &mut builder, "shared").unwrap();
        table.push_record(record).unwrap();
    }
    table.set_string_lookup(builder.finish()).unwrap();
    table
}

fn compressed_table(table_type: i16, records: i32) -> Table {
    let mut table = Table::new(TableHeader::new(table_type, 5, 0, true));
    for id in 1..=records {
        let mut record = Record::new(3, RECORD_SIZE, Ref::new(id, id % 3)).unwrap();
        let mut builder = StringLookupBuilder::new();
        record.set_string(24, &mut builder, &format!("compressed {id}")).unwrap();
        record.set_lookup(bnsdat_datafile::RecordLookup::Owned(builder.finish()));
        table.push_record(record).unwrap();
    }
    table
}

/// Twelve tables, so a name table is required.
fn build_datafile(width: IntWidth) -> Datafile {
    let mut datafile = Datafile::new(width);
    datafile.header.version = 5;
    datafile.header.client_version = [1, 0, 2, 3];
    datafile.header.created_at = 1_650_000_000;
    datafile.header.max_buffer_size = 4096;

    for table_type in 1..=12i16 {
        let table = if table_type % 4 == 0 {
            compressed_table(table_type, 20)
        } else {
            uncompressed_table(table_type, 6)
        };
        datafile.tables.push(table);
    }

    let mut names = NameTable::new();
    let mut rebuild = names.begin_rebuild();
    for table_type in [1i16, 2, 3] {
        let aliases: Vec<(String, Ref)> = datafile.tables[table_type as usize - 1]
            .records()
            .unwrap()
            .iter()
            .map(|record| (record.get_string(24).unwrap(), record.key()))
            .collect();
        rebuild.add_table(&format!("Table{table_type}"), aliases);
    }
    rebuild.end_rebuild().unwrap();
    datafile.name_table = Some(names);

    datafile
}

#[test]
fn test_rewrite_is_byte_exact() {
    for width in [IntWidth::Bits32, IntWidth::Bits64] {
        let original = build_datafile(width).to_bytes(&WriteOptions::default()).unwrap();

        for lazy in [false, true] {
            let options = ReadOptions::new().width(width).lazy(lazy);
            let datafile = Datafile::from_bytes(original.clone(), &options).unwrap();

            assert_eq!(datafile.tables.len(), 12);
            assert_eq!(datafile.header.table_count, 12);
            assert_eq!(datafile.header.version, 5);
            assert_eq!(datafile.header.client_version, [1, 0, 2, 3]);
            assert_eq!(datafile.to_bytes(&WriteOptions::default()).unwrap(), original);

            datafile.load_all().unwrap();
            assert_eq!(datafile.to_bytes(&WriteOptions::default()).unwrap(), original);
        }
    }
}

#[test]
fn test_name_table_survives_roundtrip() {
    let original = build_datafile(IntWidth::Bits32).to_bytes(&WriteOptions::default()).unwrap();
    let datafile = Datafile::from_bytes(original, &ReadOptions::new()).unwrap();

    let names = datafile.name_table.as_ref().unwrap();
    assert!(!names.is_loaded());
    assert_eq!(datafile.header.alias_count, names.len() as i64);
    assert_eq!(names.resolve("table2:alias_2_4").unwrap(), Some(Ref::new(4, 0)));
    assert_eq!(names.resolve("table9:alias_9_1").unwrap(), None);
    assert_eq!(names.aliases().unwrap().len(), 18);
}

#[test]
fn test_lazy_passthrough_keeps_untouched_tables() {
    let width = IntWidth::Bits64;
    let original = build_datafile(width).to_bytes(&WriteOptions::default()).unwrap();
    let mut datafile = Datafile::from_bytes(original.clone(), &ReadOptions::new().width(width)).unwrap();

    let start = DatafileHeader::encoded_len(width) as u64
        + datafile.header.alias_map_size as u64
        + datafile.tables[..5]
            .iter()
            .map(|table| table.header().total_len().unwrap())
            .sum::<u64>();
    let old_len = datafile.tables[5].header().total_len().unwrap();

    let records = datafile.tables[5].records_mut().unwrap();
    records.truncate(2);
    records[0].set(16, -1i64).unwrap();

    let patched = datafile.to_bytes(&WriteOptions::default()).unwrap();
    let start = start as usize;
    let old_end = start + old_len as usize;
    let new_end = patched.len() - (original.len() - old_end);

    assert_eq!(&patched[..start], &original[..start]);
    assert_eq!(&patched[new_end..], &original[old_end..]);
    assert!(new_end < old_end);
    for (index, table) in datafile.tables.iter().enumerate() {
        assert_eq!(table.is_loaded(), index == 5);
    }

    let reread = Datafile::from_bytes(patched, &ReadOptions::new().width(width).lazy(false)).unwrap();
    let records = reread.tables[5].records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get::<i64>(16).unwrap(), -1);
    assert_eq!(records[1].get_string(24).unwrap(), "alias_6_2");
}

#[test]
fn test_padding_and_count_offset_are_preserved() {
    let mut datafile = Datafile::new(IntWidth::Bits32);

    let mut padded = uncompressed_table(1, 3);
    padded.contents_mut().unwrap().padding = vec![0xCD; 5];
    datafile.tables.push(padded);

    let mut overcounted = uncompressed_table(2, 3);
    overcounted.contents_mut().unwrap().record_count_offset = 2;
    datafile.tables.push(overcounted);

    let bytes = datafile.to_bytes(&WriteOptions::default()).unwrap();
    let reread = Datafile::from_bytes(bytes.clone(), &ReadOptions::new().lazy(false)).unwrap();

    let padded = &reread.tables[0];
    assert_eq!(padded.records().unwrap().len(), 3);
    assert_eq!(padded.padding().unwrap(), &[0xCD; 5]);
    assert_eq!(padded.record_count_offset().unwrap(), 0);

    // reading stops at the lookup before the declared count is reached
    let overcounted = &reread.tables[1];
    assert_eq!(overcounted.records().unwrap().len(), 3);
    assert!(overcounted.padding().unwrap().is_empty());
    assert_eq!(overcounted.record_count_offset().unwrap(), 2);

    assert_eq!(reread.to_bytes(&WriteOptions::default()).unwrap(), bytes);
}

#[test]
fn test_compressed_blocks_respect_threshold() {
    let threshold = 200;
    let options = WriteOptions::new().compression_block_size(threshold);
    let table = compressed_table(4, 40);
    let bytes = table.to_bytes(IntWidth::Bits32, &options).unwrap();

    let mut reader = BinaryReader::new_at(&bytes, TABLE_HEADER_SIZE);
    let mut stream = CompressedRecordReader::initialize(&mut reader).unwrap();
    assert!(stream.block_count() > 1);

    let mut previous_high: Option<Ref> = None;
    let mut seen = 0;
    while let Some(block) = stream.next_block(&mut reader).unwrap() {
        assert!(block.payload.len() <= threshold || block.len() == 1);

        let records: Vec<_> = block.records().collect::<Result<_, _>>().unwrap();
        let key = |data: &[u8]| {
            let id = i32::from_le_bytes(data[8..12].try_into().unwrap());
            let variant = i32::from_le_bytes(data[12..16].try_into().unwrap());
            Ref::new(id, variant)
        };
        assert_eq!(block.low_key, key(records[0].data));
        assert_eq!(block.high_key, key(records[records.len() - 1].data));

        if let Some(high) = previous_high {
            let low = block.low_key;
            assert!((high.variant, high.id) < (low.variant, low.id));
        }
        previous_high = Some(block.high_key);
        seen += records.len();
    }
    assert_eq!(seen, 40);
    assert!(reader.is_empty());
}

#[test]
fn test_file_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");

    let datafile = build_datafile(IntWidth::Bits32);
    datafile.write_to_file(&path, &WriteOptions::default()).unwrap();
    let original = std::fs::read(&path).unwrap();

    for lazy in [true, false] {
        let read = Datafile::open(&path, &ReadOptions::new().lazy(lazy)).unwrap();
        assert_eq!(read.tables[0].records().unwrap().len(), 6);
        assert_eq!(read.to_bytes(&WriteOptions::default()).unwrap(), original);
    }
}

pub const SCHEMA_VERSION: &str = "1";

pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS digest (
        id TEXT PRIMARY KEY NOT NULL,
        size INTEGER NOT NULL,
        ext TEXT,
        mime TEXT NOT NULL,
        magic TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS attribute (
        id INTEGER PRIMARY KEY,
        digest_id TEXT NOT NULL,
        name TEXT NOT NULL,
        text TEXT NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('text', 'integer', 'rational')),
        FOREIGN KEY(digest_id) REFERENCES digest(id) ON DELETE CASCADE,
        UNIQUE(digest_id, name)
    );

    CREATE TABLE IF NOT EXISTS path (
        id TEXT PRIMARY KEY NOT NULL,
        real TEXT NOT NULL,
        mode INTEGER,
        uid INTEGER,
        gid INTEGER,
        atime INTEGER,
        mtime INTEGER,
        ctime INTEGER,
        digest_id TEXT NOT NULL,
        FOREIGN KEY(digest_id) REFERENCES digest(id)
    );
    CREATE INDEX IF NOT EXISTS idx_path_digest ON path(digest_id);

    CREATE TABLE IF NOT EXISTS tag (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL,
        description TEXT
    );

    CREATE TABLE IF NOT EXISTS tag_edge (
        tail INTEGER NOT NULL,
        head INTEGER NOT NULL,
        FOREIGN KEY(tail) REFERENCES tag(id) ON DELETE CASCADE,
        FOREIGN KEY(head) REFERENCES tag(id) ON DELETE CASCADE,
        PRIMARY KEY(tail, head)
    );
    CREATE INDEX IF NOT EXISTS idx_tag_edge_head ON tag_edge(head);

    CREATE TABLE IF NOT EXISTS content_tag_edge (
        digest TEXT NOT NULL,
        tag INTEGER NOT NULL,
        FOREIGN KEY(digest) REFERENCES digest(id) ON DELETE CASCADE,
        FOREIGN KEY(tag) REFERENCES tag(id) ON DELETE CASCADE,
        PRIMARY KEY(digest, tag)
    );
    CREATE INDEX IF NOT EXISTS idx_content_tag_edge_tag ON content_tag_edge(tag);

    CREATE TABLE IF NOT EXISTS thumbnail (
        digest_id TEXT NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        image BLOB NOT NULL,
        FOREIGN KEY(digest_id) REFERENCES digest(id) ON DELETE CASCADE,
        PRIMARY KEY(digest_id, width, height)
    );
";
